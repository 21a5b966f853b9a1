//! Logical id generation.
//!
//! A resource's logical id is derived from the construct path between its
//! stack and the resource itself. Top-level resources keep their id; deeper
//! resources get a human readable prefix plus a short hash of the full path so
//! that two paths that sanitize to the same text still differ.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Path components with this id are transparent in logical ids.
const HIDDEN_ID: &str = "Default";

const HASH_LEN: usize = 8;

/// CloudFormation caps logical ids at 255 characters.
const MAX_LOGICAL_ID_LEN: usize = 255;
const MAX_HUMAN_LEN: usize = MAX_LOGICAL_ID_LEN - HASH_LEN;

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^A-Za-z0-9]").expect("static pattern"))
}

/// Remove every character that CloudFormation does not accept in a logical id.
pub fn sanitize(component: &str) -> String {
    non_alphanumeric().replace_all(component, "").into_owned()
}

/// Build the logical id for a construct path relative to its stack.
pub fn make_logical_id(components: &[&str]) -> String {
    let visible: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if visible.len() == 1 {
        let candidate = sanitize(visible[0]);
        if candidate.len() <= MAX_LOGICAL_ID_LEN {
            return candidate;
        }
    }

    let hash = path_hash(&visible);
    let mut human = String::new();
    let mut previous: Option<&str> = None;
    for component in &visible {
        if previous == Some(*component) {
            continue;
        }
        human.push_str(&sanitize(component));
        previous = Some(component);
    }
    human.truncate(MAX_HUMAN_LEN);

    format!("{}{}", human, hash)
}

fn path_hash(components: &[&str]) -> String {
    let digest = Sha256::digest(components.join("/").as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02X}", b)).collect();
    hex[..HASH_LEN].to_string()
}
