//! Helpers over `NAME=value` environment arrays.

pub fn getenvp<'a>(env: &'a [String], name: &str) -> Option<&'a str> {
    env.iter().find_map(|entry| value_of(entry, name))
}

/// Replaces the first `name` entry, or appends one.
pub fn setenvp(env: &mut Vec<String>, name: &str, value: &str) {
    let entry = format!("{name}={value}");
    match env.iter_mut().find(|e| value_of(e, name).is_some()) {
        Some(slot) => *slot = entry,
        None => env.push(entry),
    }
}

/// Removes every `name` entry. Returns whether anything was removed.
pub fn unsetenvp(env: &mut Vec<String>, name: &str) -> bool {
    let before = env.len();
    env.retain(|e| value_of(e, name).is_none());
    env.len() != before
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0')
}

fn value_of<'a>(entry: &'a str, name: &str) -> Option<&'a str> {
    entry
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Vec<String> {
        vec!["PATH=/usr/bin".to_string(), "PATHX=1".to_string(), "EMPTY=".to_string()]
    }

    #[test]
    fn lookup_matches_whole_name() {
        let env = env();
        assert_eq!(getenvp(&env, "PATH"), Some("/usr/bin"));
        assert_eq!(getenvp(&env, "PATHX"), Some("1"));
        assert_eq!(getenvp(&env, "EMPTY"), Some(""));
        assert_eq!(getenvp(&env, "PAT"), None);
    }

    #[test]
    fn set_replaces_in_place_and_unset_removes() {
        let mut env = env();
        setenvp(&mut env, "PATH", "/bin");
        assert_eq!(env[0], "PATH=/bin");
        setenvp(&mut env, "NEW", "x");
        assert_eq!(env.last().map(String::as_str), Some("NEW=x"));

        assert!(unsetenvp(&mut env, "PATH"));
        assert!(!unsetenvp(&mut env, "PATH"));
        assert_eq!(getenvp(&env, "PATHX"), Some("1"));
    }

    #[test]
    fn names_with_equals_are_invalid() {
        assert!(is_valid_name("SLURM_X"));
        assert!(!is_valid_name("A=B"));
        assert!(!is_valid_name(""));
    }
}
