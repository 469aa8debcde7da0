//! Building remote shell command lines from user-supplied values.

/// Wrap `value` in single quotes so the remote shell takes it literally.
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".into();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Join the non-blank parts with single spaces.
pub fn join_command<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_and_empty() {
        assert_eq!(shell_quote("kube-system"), "'kube-system'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn escapes_embedded_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("a; rm -rf /"), "'a; rm -rf /'");
    }

    #[test]
    fn join_skips_blank_parts() {
        assert_eq!(
            join_command(&["microk8s kubectl get pods", "", "  -A ", "-o json"]),
            "microk8s kubectl get pods -A -o json"
        );
        assert_eq!(join_command::<&str>(&[]), "");
    }
}
