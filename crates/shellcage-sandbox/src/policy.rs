//! Access policy: the fully resolved input to profile compilation.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SandboxError};

/// Read locations needed to start a shell and a typical interpreter.
const DEFAULT_READ_SUBPATHS: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr",
    "/System",
    "/Library",
    "/opt/homebrew",
    "/opt/local",
    "/private/etc",
    "/private/var/db/dyld",
    "/private/var/db/timezone",
    "/private/var/select",
    "/private/var/db/xcode_select_link",
    "/Applications/Xcode.app/Contents/Developer",
    "/dev",
];

const DEFAULT_WRITE_LITERALS: &[&str] = &["/dev/null", "/dev/stdout", "/dev/stderr", "/dev/tty"];

const DEFAULT_WRITE_SUBPATHS: &[&str] = &["/dev/fd"];

const GLOB_CHARS: &[char] = &['*', '?', '['];

/// A validated filesystem pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPattern {
    /// Exactly this path.
    Literal(PathBuf),
    /// This path and everything beneath it.
    Subpath(PathBuf),
    /// A glob over absolute paths: `*` stays within a component, `**` crosses
    /// components, `?` is one character and `[...]` a character class.
    Glob(String),
}

impl PathPattern {
    /// Parse a user-supplied pattern. Plain paths become [`PathPattern::Subpath`].
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(invalid_pattern(raw, "pattern is empty"));
        }
        if raw.contains('\0') {
            return Err(invalid_pattern(raw, "pattern contains a NUL byte"));
        }
        if raw.contains(['\n', '\r']) {
            return Err(invalid_pattern(raw, "pattern contains a line break"));
        }
        if !raw.starts_with('/') {
            return Err(invalid_pattern(raw, "pattern must be an absolute path"));
        }

        if raw.contains(GLOB_CHARS) {
            if raw.contains(['"', '\\']) {
                return Err(invalid_pattern(raw, "glob must not contain '\"' or '\\'"));
            }
            check_brackets(raw)?;
            return Ok(PathPattern::Glob(raw.to_string()));
        }
        if raw.contains(']') {
            return Err(invalid_pattern(raw, "unbalanced ']'"));
        }

        Ok(PathPattern::Subpath(PathBuf::from(raw)))
    }

    pub fn literal(path: impl Into<PathBuf>) -> Self {
        PathPattern::Literal(path.into())
    }

    pub fn subpath(path: impl Into<PathBuf>) -> Self {
        PathPattern::Subpath(path.into())
    }

    /// Resolve symlinks in the non-glob part of the pattern, e.g. `/tmp` ->
    /// `/private/tmp` on macOS. Paths that do not exist are kept as written.
    pub fn canonicalized(self) -> Self {
        match self {
            PathPattern::Literal(path) => PathPattern::Literal(canonicalize_or_keep(path)),
            PathPattern::Subpath(path) => PathPattern::Subpath(canonicalize_or_keep(path)),
            PathPattern::Glob(glob) => {
                let Some(first_glob) = glob.find(GLOB_CHARS) else {
                    return PathPattern::Glob(glob);
                };
                let Some(split) = glob[..first_glob].rfind('/') else {
                    return PathPattern::Glob(glob);
                };
                let (prefix, rest) = glob.split_at(split);
                if prefix.is_empty() {
                    return PathPattern::Glob(glob);
                }
                let canonical = canonicalize_or_keep(PathBuf::from(prefix));
                PathPattern::Glob(format!("{}{rest}", canonical.to_string_lossy()))
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Literal(path) | PathPattern::Subpath(path) => {
                write!(f, "{}", path.display())
            }
            PathPattern::Glob(glob) => f.write_str(glob),
        }
    }
}

fn canonicalize_or_keep(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}

fn check_brackets(raw: &str) -> Result<()> {
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    return Err(invalid_pattern(raw, "empty glob character class"));
                }
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some('[') => return Err(invalid_pattern(raw, "nested '[' in glob")),
                        Some('/') => {
                            return Err(invalid_pattern(raw, "'/' inside a glob character class"));
                        }
                        Some(_) => {}
                        None => return Err(invalid_pattern(raw, "unbalanced '['")),
                    }
                }
            }
            ']' => return Err(invalid_pattern(raw, "unbalanced ']'")),
            _ => {}
        }
    }
    Ok(())
}

fn invalid_pattern(raw: &str, reason: &str) -> SandboxError {
    SandboxError::PolicyValidation(format!("invalid path pattern {raw:?}: {reason}"))
}

/// Paths readable when the policy carries no read allow-list.
pub fn default_read_patterns() -> Vec<PathPattern> {
    DEFAULT_READ_SUBPATHS
        .iter()
        .map(|p| PathPattern::subpath(*p))
        .collect()
}

/// Paths writable when the policy carries no write allow-list.
pub fn default_write_patterns() -> Vec<PathPattern> {
    DEFAULT_WRITE_LITERALS
        .iter()
        .map(|p| PathPattern::literal(*p))
        .chain(DEFAULT_WRITE_SUBPATHS.iter().map(|p| PathPattern::subpath(*p)))
        .collect()
}

/// What the sandboxed command is allowed to do. Built once per invocation
/// through [`AccessPolicy::builder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    command: String,
    needs_network_restriction: bool,
    allow_local_binding: bool,
    read_allow_list: Option<Vec<PathPattern>>,
    write_allow_list: Option<Vec<PathPattern>>,
}

impl AccessPolicy {
    pub fn builder(command: impl Into<String>) -> AccessPolicyBuilder {
        AccessPolicyBuilder::new(command)
    }

    /// The shell command line, exactly as supplied.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn needs_network_restriction(&self) -> bool {
        self.needs_network_restriction
    }

    pub fn allow_local_binding(&self) -> bool {
        self.allow_local_binding
    }

    pub fn read_allow_list(&self) -> Option<&[PathPattern]> {
        self.read_allow_list.as_deref()
    }

    pub fn write_allow_list(&self) -> Option<&[PathPattern]> {
        self.write_allow_list.as_deref()
    }

    /// The read patterns in effect, falling back to [`default_read_patterns`].
    pub fn effective_read_patterns(&self) -> Vec<PathPattern> {
        self.read_allow_list
            .clone()
            .unwrap_or_else(default_read_patterns)
    }

    /// The write patterns in effect, falling back to [`default_write_patterns`].
    pub fn effective_write_patterns(&self) -> Vec<PathPattern> {
        self.write_allow_list
            .clone()
            .unwrap_or_else(default_write_patterns)
    }
}

/// Collects raw policy fields; [`AccessPolicyBuilder::build`] validates them.
#[derive(Debug, Clone)]
pub struct AccessPolicyBuilder {
    command: String,
    needs_network_restriction: bool,
    allow_local_binding: bool,
    read_allow_list: Option<Vec<String>>,
    write_allow_list: Option<Vec<String>>,
    extra_read: Vec<String>,
    extra_write: Vec<String>,
    canonicalize: bool,
}

impl AccessPolicyBuilder {
    fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            needs_network_restriction: true,
            allow_local_binding: false,
            read_allow_list: None,
            write_allow_list: None,
            extra_read: Vec::new(),
            extra_write: Vec::new(),
            canonicalize: false,
        }
    }

    pub fn network_restriction(mut self, enabled: bool) -> Self {
        self.needs_network_restriction = enabled;
        self
    }

    pub fn allow_local_binding(mut self, allowed: bool) -> Self {
        self.allow_local_binding = allowed;
        self
    }

    pub fn read_allow_list<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_allow_list = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn write_allow_list<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_allow_list = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Append read patterns to the configured list, or to the defaults when
    /// no list is set.
    pub fn extend_read_allow_list<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_read.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Append write patterns to the configured list, or to the defaults when
    /// no list is set.
    pub fn extend_write_allow_list<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_write.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Resolve symlinks in user patterns against the live filesystem.
    pub fn canonicalize_paths(mut self, enabled: bool) -> Self {
        self.canonicalize = enabled;
        self
    }

    pub fn build(self) -> Result<AccessPolicy> {
        if self.allow_local_binding && !self.needs_network_restriction {
            return Err(SandboxError::PolicyValidation(
                "allow_local_binding requires network restriction; without it binding is \
                 already unrestricted"
                    .to_string(),
            ));
        }

        let canonicalize = self.canonicalize;
        let parse_all = |raw: Option<Vec<String>>| -> Result<Option<Vec<PathPattern>>> {
            raw.map(|patterns| parse_patterns(&patterns, canonicalize))
                .transpose()
        };

        let read_allow_list = merge_patterns(
            parse_all(self.read_allow_list)?,
            parse_patterns(&self.extra_read, canonicalize)?,
            default_read_patterns,
        );
        let write_allow_list = merge_patterns(
            parse_all(self.write_allow_list)?,
            parse_patterns(&self.extra_write, canonicalize)?,
            default_write_patterns,
        );

        Ok(AccessPolicy {
            read_allow_list,
            write_allow_list,
            command: self.command,
            needs_network_restriction: self.needs_network_restriction,
            allow_local_binding: self.allow_local_binding,
        })
    }
}

fn parse_patterns(raw: &[String], canonicalize: bool) -> Result<Vec<PathPattern>> {
    raw.iter()
        .map(|p| {
            let pattern = PathPattern::parse(p)?;
            Ok(if canonicalize {
                pattern.canonicalized()
            } else {
                pattern
            })
        })
        .collect()
}

/// Extra patterns go after `base` (or the built-in defaults), skipping repeats.
fn merge_patterns(
    base: Option<Vec<PathPattern>>,
    extra: Vec<PathPattern>,
    defaults: fn() -> Vec<PathPattern>,
) -> Option<Vec<PathPattern>> {
    if extra.is_empty() {
        return base;
    }
    let mut merged = base.unwrap_or_else(defaults);
    for pattern in extra {
        if !merged.contains(&pattern) {
            merged.push(pattern);
        }
    }
    Some(merged)
}

/// Expand a leading `~` against `home`. Other patterns are returned unchanged.
pub fn expand_home(raw: &str, home: Option<&Path>) -> String {
    let Some(home) = home else {
        return raw.to_string();
    };
    if raw == "~" {
        return home.to_string_lossy().into_owned();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest).to_string_lossy().into_owned(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let policy = AccessPolicy::builder("echo hi").build().unwrap();
        assert_eq!(policy.command(), "echo hi");
        assert!(policy.needs_network_restriction());
        assert!(!policy.allow_local_binding());
        assert!(policy.read_allow_list().is_none());
        assert!(policy.write_allow_list().is_none());
    }

    #[test]
    fn test_absent_lists_fall_back_to_defaults() {
        let policy = AccessPolicy::builder("true").build().unwrap();
        assert_eq!(policy.effective_read_patterns(), default_read_patterns());
        assert_eq!(policy.effective_write_patterns(), default_write_patterns());
        assert!(
            policy
                .effective_write_patterns()
                .contains(&PathPattern::literal("/dev/null"))
        );
    }

    #[test]
    fn test_empty_list_is_not_default() {
        let policy = AccessPolicy::builder("true")
            .write_allow_list(Vec::<String>::new())
            .build()
            .unwrap();
        assert_eq!(policy.write_allow_list(), Some(&[][..]));
        assert!(policy.effective_write_patterns().is_empty());
    }

    #[test]
    fn test_local_binding_without_restriction_is_rejected() {
        let err = AccessPolicy::builder("true")
            .network_restriction(false)
            .allow_local_binding(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, SandboxError::PolicyValidation(_)));
    }

    #[test]
    fn test_parse_plain_path_is_subpath() {
        assert_eq!(
            PathPattern::parse("/Users/me/project").unwrap(),
            PathPattern::subpath("/Users/me/project")
        );
    }

    #[test]
    fn test_parse_glob() {
        assert_eq!(
            PathPattern::parse("/tmp/**/*.log").unwrap(),
            PathPattern::Glob("/tmp/**/*.log".to_string())
        );
        assert!(matches!(
            PathPattern::parse("/data/[abc]/x").unwrap(),
            PathPattern::Glob(_)
        ));
        assert!(matches!(
            PathPattern::parse("/data/[!a]x").unwrap(),
            PathPattern::Glob(_)
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_patterns() {
        for raw in [
            "",
            "relative/path",
            "/tmp/[abc",
            "/tmp/abc]",
            "/tmp/[a[b]]",
            "/tmp/[a/b]",
            "/tmp/a\0b",
            "/tmp/a\nb",
            "/tmp/*\"",
            "/tmp/\\*",
            "/tmp/[]x",
            "/tmp/[!]x",
            "/tmp/[^]x",
            "/tmp/[]a]",
        ] {
            let err = PathPattern::parse(raw).unwrap_err();
            assert!(
                matches!(err, SandboxError::PolicyValidation(_)),
                "expected validation error for {raw:?}"
            );
        }
    }

    #[test]
    fn test_extend_without_list_keeps_default_patterns_intact() {
        let policy = AccessPolicy::builder("true")
            .extend_write_allow_list(["/definitely/missing/out"])
            .canonicalize_paths(true)
            .build()
            .unwrap();
        let write = policy.write_allow_list().unwrap();
        assert_eq!(&write[..write.len() - 1], default_write_patterns().as_slice());
        assert!(write.contains(&PathPattern::literal("/dev/null")));
        assert!(write.contains(&PathPattern::subpath("/dev/fd")));
        assert_eq!(
            write.last(),
            Some(&PathPattern::subpath("/definitely/missing/out"))
        );
        assert!(policy.read_allow_list().is_none());
    }

    #[test]
    fn test_extend_appends_to_configured_list() {
        let policy = AccessPolicy::builder("true")
            .read_allow_list(["/usr", "/opt/data"])
            .extend_read_allow_list(["/opt/data", "/srv"])
            .build()
            .unwrap();
        assert_eq!(
            policy.read_allow_list().unwrap(),
            &[
                PathPattern::subpath("/usr"),
                PathPattern::subpath("/opt/data"),
                PathPattern::subpath("/srv"),
            ]
        );
    }

    #[test]
    fn test_extend_validates_patterns() {
        let err = AccessPolicy::builder("true")
            .extend_read_allow_list(["/tmp/[]x"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SandboxError::PolicyValidation(_)));
    }

    #[test]
    fn test_default_read_list_reaches_developer_tools() {
        let defaults = default_read_patterns();
        for path in [
            "/Library/Developer/CommandLineTools",
            "/Applications/Xcode.app/Contents/Developer",
            "/private/var/db/xcode_select_link",
        ] {
            assert!(
                defaults.iter().any(|d| matches!(
                    d,
                    PathPattern::Subpath(root) if Path::new(path).starts_with(root)
                )),
                "{path} not readable by default"
            );
        }
    }

    #[test]
    fn test_build_reports_bad_pattern() {
        let err = AccessPolicy::builder("true")
            .read_allow_list(["/usr", "nope"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_canonicalized_keeps_missing_paths() {
        let pattern = PathPattern::subpath("/definitely/not/here").canonicalized();
        assert_eq!(pattern, PathPattern::subpath("/definitely/not/here"));
    }

    #[test]
    fn test_canonicalized_glob_prefix() {
        let dir = tempfile::TempDir::new().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let raw = format!("{}/*.txt", dir.path().display());
        let pattern = PathPattern::parse(&raw).unwrap().canonicalized();
        assert_eq!(
            pattern,
            PathPattern::Glob(format!("{}/*.txt", canonical.display()))
        );
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/Users/me");
        assert_eq!(expand_home("~", Some(home)), "/Users/me");
        assert_eq!(expand_home("~/src", Some(home)), "/Users/me/src");
        assert_eq!(expand_home("/etc", Some(home)), "/etc");
        assert_eq!(expand_home("~other/x", Some(home)), "~other/x");
        assert_eq!(expand_home("~/src", None), "~/src");
    }
}
