use std::path::{Component, Path, PathBuf};

/// Resolve `.`/`..` components lexically without touching the filesystem.
/// Used ahead of a scope check so scope decisions do not depend on symlinks
/// or file existence (§4.3: "symlink-free path normalization").
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// The outcome of a scope check (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeVerdict {
    pub in_scope: bool,
    pub message: Option<String>,
}

/// A target is in scope of `base` iff, after lexical normalization, it equals
/// `base` or is nested under `base/`. No rule lookup is involved (§4.3).
pub fn check_scope(base: &Path, target: &Path) -> ScopeVerdict {
    let base = normalize_path(base);
    let target = normalize_path(target);

    if target == base || target.starts_with(&base) {
        ScopeVerdict {
            in_scope: true,
            message: None,
        }
    } else {
        ScopeVerdict {
            in_scope: false,
            message: Some(format!(
                "path `{}` is outside the scope of `{}`",
                target.display(),
                base.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflexive_base_is_in_scope_of_itself() {
        let base = Path::new("/app/src");
        assert!(check_scope(base, base).in_scope);
    }

    #[test]
    fn nested_path_is_in_scope() {
        assert!(check_scope(Path::new("/app/src"), Path::new("/app/src/main.rs")).in_scope);
    }

    #[test]
    fn sibling_path_is_out_of_scope() {
        // Antisymmetric with respect to sibling paths: neither considers the
        // other in scope.
        assert!(!check_scope(Path::new("/app/src"), Path::new("/app/other")).in_scope);
        assert!(!check_scope(Path::new("/app/other"), Path::new("/app/src")).in_scope);
    }

    #[test]
    fn out_of_bounds_path_is_rejected() {
        let verdict = check_scope(Path::new("/app/src"), Path::new("/etc/passwd"));
        assert!(!verdict.in_scope);
        assert!(verdict.message.is_some());
    }

    #[test]
    fn trailing_slash_does_not_change_the_verdict() {
        let with_slash = check_scope(Path::new("/app/src/"), Path::new("/app/src/main.rs/"));
        let without_slash = check_scope(Path::new("/app/src"), Path::new("/app/src/main.rs"));
        assert_eq!(with_slash.in_scope, without_slash.in_scope);
    }

    #[test]
    fn dot_dot_traversal_is_resolved_before_comparison() {
        let verdict = check_scope(Path::new("/app/src"), Path::new("/app/src/../../etc/passwd"));
        assert!(!verdict.in_scope);
    }
}
