//! Location of the control socket.
//!
//! Inside a Hyprland session the socket sits next to Hyprland's own:
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.hyprmate.sock`.
//! Outside of one it falls back to `$XDG_DATA_HOME/.hyprmate.sock`, or
//! `~/.local/share/.hyprmate.sock`.

use std::path::PathBuf;

/// File name of the control socket.
pub const SOCKET_NAME: &str = ".hyprmate.sock";

/// Longest path a Unix socket address can hold.
pub const MAX_SOCKET_PATH_LEN: usize = 107;

/// The control socket cannot be located.
#[derive(Debug, thiserror::Error)]
#[error("cannot locate the control socket: {0}")]
pub struct PathError(String);

/// Resolve the control socket path from the process environment.
pub fn control_socket_path() -> Result<PathBuf, PathError> {
    resolve(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Resolve the control socket path with an explicit environment lookup.
pub fn resolve(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf, PathError> {
    let folder = match (env("XDG_RUNTIME_DIR"), env("HYPRLAND_INSTANCE_SIGNATURE")) {
        (Some(runtime), Some(his)) => PathBuf::from(format!("{}/hypr/{}", runtime, his)),
        _ => match (env("XDG_DATA_HOME"), env("HOME")) {
            (Some(data), _) => PathBuf::from(data),
            (None, Some(home)) => PathBuf::from(home).join(".local/share"),
            (None, None) => {
                return Err(PathError(
                    "neither HYPRLAND_INSTANCE_SIGNATURE, XDG_DATA_HOME nor HOME is set".into(),
                ))
            }
        },
    };
    let path = folder.join(SOCKET_NAME);
    if path.as_os_str().len() > MAX_SOCKET_PATH_LEN {
        return Err(PathError(format!(
            "{} is longer than {} bytes",
            path.display(),
            MAX_SOCKET_PATH_LEN
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn hyprland_session_uses_instance_dir() {
        let path = resolve(env(&[
            ("XDG_RUNTIME_DIR", "/run/user/1000"),
            ("HYPRLAND_INSTANCE_SIGNATURE", "abc_123"),
        ]))
        .unwrap();
        assert_eq!(path, PathBuf::from("/run/user/1000/hypr/abc_123/.hyprmate.sock"));
    }

    #[test]
    fn standalone_falls_back_to_data_dirs() {
        let path = resolve(env(&[("XDG_DATA_HOME", "/data"), ("HOME", "/home/u")])).unwrap();
        assert_eq!(path, PathBuf::from("/data/.hyprmate.sock"));
        let path = resolve(env(&[("HOME", "/home/u")])).unwrap();
        assert_eq!(path, PathBuf::from("/home/u/.local/share/.hyprmate.sock"));
    }

    #[test]
    fn unresolvable_environment_is_an_error() {
        assert!(resolve(env(&[])).is_err());
        let long = "x".repeat(120);
        assert!(resolve(env(&[("XDG_DATA_HOME", long.as_str())])).is_err());
    }
}
