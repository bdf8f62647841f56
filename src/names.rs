//! Conversion between caller-style JSON key names (lowercase-with-hyphens)
//! and the Docker wire style (CamelCase with a capital first letter).
//!
//! A few keys are opaque to the convention: the subtrees under `Labels` and
//! `Containers` hold user-defined keys and are carried verbatim, and keys
//! containing a `.` are domain-qualified labels that are never rewritten.

use serde_json::Value;

/// Wire-side keys whose subtrees hold user data and must not be rewritten.
const OPAQUE_DOCKER_KEYS: [&str; 2] = ["Labels", "Containers"];

/// Caller-side spellings of [OPAQUE_DOCKER_KEYS].
const OPAQUE_CALLER_KEYS: [&str; 2] = ["labels", "containers"];

/// Rewrites caller-style keys into Docker wire style, recursing through
/// objects and arrays. Strings, numbers, booleans, and null pass through.
pub fn to_docker(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| {
                    if key.contains('.') {
                        (key, value)
                    } else if OPAQUE_CALLER_KEYS.contains(&key.as_str()) {
                        (to_docker_key(&key), value)
                    } else {
                        (to_docker_key(&key), to_docker(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(to_docker).collect()),
        value => value,
    }
}

/// Rewrites Docker wire style keys into caller style, recursing through
/// objects and arrays. The inverse of [to_docker] for caller-style data.
pub fn from_docker(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| {
                    if key.contains('.') {
                        (key, value)
                    } else if OPAQUE_DOCKER_KEYS.contains(&key.as_str()) {
                        (from_docker_key(&key), value)
                    } else {
                        (from_docker_key(&key), from_docker(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(from_docker).collect()),
        value => value,
    }
}

/// `host-config` -> `HostConfig`
fn to_docker_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut capitalize_next = true;

    for c in key.chars() {
        if c == '-' {
            capitalize_next = true;
        } else if capitalize_next {
            out.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }

    out
}

/// `HostConfig` -> `host-config`. A run of consecutive uppercase letters gets
/// a single hyphen in front of it.
fn from_docker_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_is_upper = true;

    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !prev_is_upper && !out.is_empty() {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_is_upper = true;
        } else {
            out.push(c);
            prev_is_upper = false;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rewrites_keys_to_docker_style() {
        let value = json!({
            "host-config": {"port-bindings": {"80/tcp": [{"host-port": "8080"}]}},
            "image": "alpine",
        });

        assert_eq!(
            to_docker(value),
            json!({
                "HostConfig": {"PortBindings": {"80/tcp": [{"HostPort": "8080"}]}},
                "Image": "alpine",
            })
        );
    }

    #[test]
    fn rewrites_keys_from_docker_style() {
        let value = json!({
            "HostConfig": {"NetworkMode": "bridge"},
            "Id": "abc123",
            "State": {"ExitCode": 0},
        });

        assert_eq!(
            from_docker(value),
            json!({
                "host-config": {"network-mode": "bridge"},
                "id": "abc123",
                "state": {"exit-code": 0},
            })
        );
    }

    #[test]
    fn uppercase_runs_collapse_to_one_hyphen() {
        assert_eq!(from_docker_key("IPAddress"), "ipaddress");
        assert_eq!(from_docker_key("ID"), "id");
        assert_eq!(from_docker_key("OOMKilled"), "oomkilled");
    }

    #[test]
    fn label_subtrees_are_carried_verbatim() {
        let value = json!({
            "Labels": {"com.example.MyLabel": "SomeValue", "another-key": "v"},
            "Name": "web",
        });

        assert_eq!(
            from_docker(value),
            json!({
                "labels": {"com.example.MyLabel": "SomeValue", "another-key": "v"},
                "name": "web",
            })
        );
    }

    #[test]
    fn network_containers_keep_container_ids_as_keys() {
        let value = json!({
            "Name": "bridge",
            "Containers": {"4fa6e0f0c678": {"Name": "web", "IPv4Address": "172.17.0.2/16"}},
        });

        assert_eq!(
            from_docker(value),
            json!({
                "name": "bridge",
                "containers": {"4fa6e0f0c678": {"Name": "web", "IPv4Address": "172.17.0.2/16"}},
            })
        );
    }

    #[test]
    fn dotted_keys_pass_through_both_directions() {
        let value = json!({"com.example.label": {"Inner": 1}});
        assert_eq!(to_docker(value.clone()), value);
        assert_eq!(from_docker(value.clone()), value);
    }

    #[test]
    fn caller_style_round_trips() {
        let value = json!({
            "host-config": {"cpu-shares": 512, "binds": ["/a:/b"]},
            "labels": {"User.Key": "untouched"},
            "env": ["FOO=bar"],
            "tty": true,
        });

        assert_eq!(from_docker(to_docker(value.clone())), value);
    }

    #[test]
    fn scalars_pass_through_untouched() {
        assert_eq!(to_docker(json!("a-string")), json!("a-string"));
        assert_eq!(from_docker(json!(42)), json!(42));
        assert_eq!(to_docker(json!(null)), json!(null));
    }
}
