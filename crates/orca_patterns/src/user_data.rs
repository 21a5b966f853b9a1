//! Instance bootstrap scripts.

use serde_json::{json, Value};

use orca_core::intrinsics::{self, Aws};

/// Docker volume driver installed on every container instance.
pub const VOLUME_DRIVER: &str = "rexray/ebs";

/// A shell script assembled line by line. Lines may contain template tokens.
#[derive(Debug, Clone)]
pub struct UserData {
    lines: Vec<Vec<Value>>,
}

impl UserData {
    pub fn for_linux() -> Self {
        Self {
            lines: vec![vec![json!("#!/bin/bash")]],
        }
    }

    pub fn add_commands<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for command in commands {
            self.lines.push(vec![Value::String(command.into())]);
        }
    }

    /// Add a command built from literal and token fragments.
    pub fn add_command_parts(&mut self, parts: Vec<Value>) {
        self.lines.push(parts);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The script as a single (possibly tokenized) string.
    pub fn render(&self) -> Value {
        let mut parts = Vec::new();
        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                parts.push(json!("\n"));
            }
            parts.extend(line.iter().cloned());
        }
        intrinsics::join("", parts)
    }

    /// Value for a launch configuration's `UserData`.
    pub fn to_base64(&self) -> Value {
        intrinsics::base64(self.render())
    }
}

/// Bootstrap script that joins an instance to the cluster, enables SSM and
/// installs the EBS volume plugin.
///
/// `cluster_name` is usually a `Ref` to the cluster, since the cluster name
/// may be generated at deploy time.
pub fn ecs_instance_bootstrap(cluster_name: Value) -> UserData {
    let mut user_data = UserData::for_linux();
    user_data.add_commands([
        "sudo yum -y update",
        "sudo yum -y install wget",
        "sudo touch /etc/ecs/ecs.config",
        "sudo amazon-linux-extras disable docker",
        "sudo amazon-linux-extras install -y ecs",
    ]);
    user_data.add_command_parts(vec![
        json!("echo \"ECS_CLUSTER="),
        cluster_name,
        json!("\" >>  /etc/ecs/ecs.config"),
    ]);
    user_data.add_commands([
        "echo \"ECS_AWSVPC_BLOCK_IMDS=true\" >> /etc/ecs/ecs.config",
        "sudo systemctl enable --now --no-block ecs.service",
        "sudo systemctl enable --now amazon-ssm-agent",
    ]);
    user_data.add_command_parts(vec![
        json!(format!(
            "docker plugin install {} REXRAY_PREEMPT=true EBS_REGION=",
            VOLUME_DRIVER
        )),
        Aws::region(),
        json!(" --grant-all-permissions"),
    ]);
    user_data
}
