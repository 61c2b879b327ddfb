//! Resolution of caller-supplied paths against the configured base
//! location.

/// A caller-supplied path together with its resolved form.
///
/// Resolution is idempotent: feeding a resolved path back in returns it
/// unchanged, so a location can be resolved again without stacking the
/// base onto itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    raw: String,
    resolved: String,
}

impl FileLocation {
    /// Resolve `path` against `base`:
    ///
    /// * a leading `$hdfs` or `${hdfs}` token is replaced with the base,
    /// * a path already under the base is left alone,
    /// * anything else is joined onto the base.
    ///
    /// Without a configured base the path passes through unchanged.
    pub fn resolve(path: &str, base: Option<&str>) -> Self {
        let raw = path.to_owned();
        let resolved = match base {
            None => raw.clone(),
            Some(base) => {
                let base = base.trim_end_matches('/');
                if let Some(rest) = path.strip_prefix("${hdfs}").or_else(|| path.strip_prefix("$hdfs")) {
                    format!("{}{}", base, rest)
                } else if path == base || path.starts_with(&format!("{}/", base)) {
                    raw.clone()
                } else if let Some(rest) = path.strip_prefix('/') {
                    format!("{}/{}", base, rest)
                } else {
                    format!("{}/{}", base, path)
                }
            }
        };
        Self { raw, resolved }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn resolved(&self) -> &str {
        &self.resolved
    }
}
