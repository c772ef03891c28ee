//! Conflict resolution: diff between the local payload and the server copy

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// How the user settles a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the server copy with the local payload
    KeepMine,
    /// Reload the server copy into the wizard and review again
    TakeTheirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present locally, absent on the server
    Added,
    /// Present on the server, absent locally
    Removed,
    /// Present on both sides with different values
    Changed,
}

/// One differing leaf between local and remote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    /// Dotted path, e.g. `connector.spec.url`
    pub path: String,
    pub kind: ChangeKind,
    pub local: Option<Value>,
    pub remote: Option<Value>,
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::Added => write!(
                f,
                "+ {}: {}",
                self.path,
                self.local.as_ref().unwrap_or(&Value::Null)
            ),
            ChangeKind::Removed => write!(
                f,
                "- {}: {}",
                self.path,
                self.remote.as_ref().unwrap_or(&Value::Null)
            ),
            ChangeKind::Changed => write!(
                f,
                "~ {}: {} -> {}",
                self.path,
                self.remote.as_ref().unwrap_or(&Value::Null),
                self.local.as_ref().unwrap_or(&Value::Null)
            ),
        }
    }
}

/// Leaf-level differences between the local payload and the server copy
///
/// Objects are walked key by key; arrays and scalars compare as a whole.
pub fn diff(local: &Value, remote: &Value) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    walk("", local, remote, &mut entries);
    entries
}

fn walk(path: &str, local: &Value, remote: &Value, out: &mut Vec<DiffEntry>) {
    match (local, remote) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, lv) in l {
                let child = join(path, key);
                match r.get(key) {
                    Some(rv) => walk(&child, lv, rv, out),
                    None => out.push(DiffEntry {
                        path: child,
                        kind: ChangeKind::Added,
                        local: Some(lv.clone()),
                        remote: None,
                    }),
                }
            }
            for (key, rv) in r {
                if !l.contains_key(key) {
                    out.push(DiffEntry {
                        path: join(path, key),
                        kind: ChangeKind::Removed,
                        local: None,
                        remote: Some(rv.clone()),
                    });
                }
            }
        }
        (l, r) if l != r => out.push(DiffEntry {
            path: path.to_string(),
            kind: ChangeKind::Changed,
            local: Some(l.clone()),
            remote: Some(r.clone()),
        }),
        _ => {}
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// One line per entry, in diff order
pub fn render_diff(entries: &[DiffEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
