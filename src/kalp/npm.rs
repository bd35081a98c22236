//! Dependency installer gate.
//!
//! Before any watcher starts, the project's `package.json` is compared with
//! what is present under `node_modules`. If something is missing or older
//! than the declared requirement, the install command runs first.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{JnsError, JnsResult};
use crate::paths::find_file_up_hierarchy;

pub const PACKAGE_JSON: &str = "package.json";
pub const NODE_MODULES_DIR: &str = "node_modules";

/// The two dependency buckets of a `package.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InstalledPackage {
    version: String,
}

/// A declared version requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequirement {
    /// Satisfied only by a byte-identical version string.
    Exact(String),
    /// `^x.y.z` or `~x.y.z`: satisfied by the same or any later version.
    Compatible { major: u64, minor: u64, patch: u64 },
    /// A `^`/`~` requirement whose components could not be read.
    Unknown(String),
}

impl VersionRequirement {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with('^') || raw.starts_with('~') {
            match parse_version(raw) {
                Some((major, minor, patch)) => VersionRequirement::Compatible {
                    major,
                    minor,
                    patch,
                },
                None => VersionRequirement::Unknown(raw.to_string()),
            }
        } else {
            VersionRequirement::Exact(raw.to_string())
        }
    }

    /// Whether an installed version satisfies this requirement.
    ///
    /// An installed version that cannot be decomposed carries no
    /// information and counts as satisfying a compatible-with requirement.
    pub fn is_satisfied_by(&self, actual: &str) -> bool {
        match self {
            VersionRequirement::Exact(expected) => expected == actual,
            VersionRequirement::Unknown(_) => true,
            VersionRequirement::Compatible {
                major,
                minor,
                patch,
            } => match parse_version(actual) {
                Some(installed) => (*major, *minor, *patch) <= installed,
                None => true,
            },
        }
    }
}

/// Reads (major, minor, patch) from the first run of digits in each of the
/// first three dot-separated segments.
pub fn parse_version(raw: &str) -> Option<(u64, u64, u64)> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()?;
    let mut parts = raw.split('.').map(|part| {
        digits
            .find(part)
            .and_then(|m| m.as_str().parse::<u64>().ok())
    });
    let major = parts.next()??;
    let minor = parts.next()??;
    let patch = parts.next()??;
    Some((major, minor, patch))
}

/// Outcome of a dependency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Directory holding the `package.json` that was checked.
    pub manifest_dir: PathBuf,
    /// Declared dependencies with no directory under `node_modules`.
    pub uninstalled: BTreeSet<String>,
    /// Installed dependencies whose version does not satisfy the requirement.
    pub out_of_date: BTreeSet<String>,
}

impl DependencyReport {
    pub fn needs_install(&self) -> bool {
        !self.uninstalled.is_empty() || !self.out_of_date.is_empty()
    }
}

/// Locates the manifest above `root` and parses it.
pub fn load_manifest(root: &Path) -> JnsResult<(PathBuf, PackageManifest)> {
    let dir = find_file_up_hierarchy(root, PACKAGE_JSON).ok_or_else(|| JnsError::NotFound {
        file: PACKAGE_JSON.to_string(),
        start: root.to_path_buf(),
    })?;
    let path = dir.join(PACKAGE_JSON);
    let raw = std::fs::read_to_string(&path)?;
    let manifest =
        serde_json::from_str(&raw).map_err(|source| JnsError::Manifest { path, source })?;
    Ok((dir, manifest))
}

/// Checks every declared dependency of the project containing `root`.
pub fn check_dependencies(root: &Path) -> JnsResult<DependencyReport> {
    let (manifest_dir, manifest) = load_manifest(root)?;
    let mut report = DependencyReport {
        manifest_dir,
        ..DependencyReport::default()
    };
    let declared = manifest
        .dev_dependencies
        .iter()
        .chain(manifest.dependencies.iter());
    for (name, requirement) in declared {
        let package_dir = report.manifest_dir.join(NODE_MODULES_DIR).join(name);
        if !package_dir.is_dir() {
            report.uninstalled.insert(name.clone());
        } else if !is_up_to_date(&package_dir, requirement) {
            report.out_of_date.insert(name.clone());
        }
    }
    debug!(
        dir = %report.manifest_dir.display(),
        uninstalled = report.uninstalled.len(),
        out_of_date = report.out_of_date.len(),
        "dependency check finished"
    );
    Ok(report)
}

// Some packages ship without a package.json; a missing or unreadable one
// means "no information" and counts as up to date.
fn is_up_to_date(package_dir: &Path, requirement: &str) -> bool {
    let Ok(raw) = std::fs::read_to_string(package_dir.join(PACKAGE_JSON)) else {
        return true;
    };
    let Ok(installed) = serde_json::from_str::<InstalledPackage>(&raw) else {
        return true;
    };
    VersionRequirement::parse(requirement).is_satisfied_by(&installed.version)
}

/// Runs `install_cmd` in the manifest directory when the report asks for it.
///
/// Returns whether the install command was run. A nonzero exit is logged,
/// not raised; the watchers will surface any breakage themselves.
pub async fn ensure_dependencies(
    report: &DependencyReport,
    install_cmd: &[String],
    dry_run: bool,
) -> JnsResult<bool> {
    if !report.needs_install() || dry_run {
        return Ok(false);
    }
    let Some((program, args)) = install_cmd.split_first() else {
        return Ok(false);
    };
    let status = Command::new(program)
        .args(args)
        .current_dir(&report.manifest_dir)
        .status()
        .await
        .map_err(|source| JnsError::Spawn {
            command: shell_words::join(install_cmd),
            source,
        })?;
    if !status.success() {
        warn!(
            dir = %report.manifest_dir.display(),
            code = ?status.code(),
            "install command failed"
        );
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    fn project(manifest: &str) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(PACKAGE_JSON), manifest).unwrap();
        fs::create_dir_all(tmp.path().join(NODE_MODULES_DIR)).unwrap();
        tmp
    }

    fn install(tmp: &tempfile::TempDir, name: &str, manifest: Option<&str>) {
        let dir = tmp.path().join(NODE_MODULES_DIR).join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(manifest) = manifest {
            fs::write(dir.join(PACKAGE_JSON), manifest).unwrap();
        }
    }

    #[test]
    fn compatible_requirements_compare_components() {
        let req = VersionRequirement::parse("^1.2.3");
        assert!(req.is_satisfied_by("1.2.5"));
        assert!(req.is_satisfied_by("1.2.3"));
        assert!(req.is_satisfied_by("2.0.0"));
        assert!(req.is_satisfied_by("1.3.0"));
        assert!(!req.is_satisfied_by("1.1.9"));
        assert!(!req.is_satisfied_by("1.2.2"));
        assert!(!req.is_satisfied_by("0.9.9"));

        let tilde = VersionRequirement::parse("~4.17.0");
        assert!(tilde.is_satisfied_by("4.17.21"));
        assert!(!tilde.is_satisfied_by("4.16.99"));
    }

    #[test]
    fn exact_requirements_need_identical_strings() {
        let req = VersionRequirement::parse("1.0.0");
        assert!(req.is_satisfied_by("1.0.0"));
        assert!(!req.is_satisfied_by("1.0.0-beta"));
        assert!(!req.is_satisfied_by("1.0.1"));
    }

    #[test]
    fn parse_version_takes_first_digit_run() {
        assert_eq!(parse_version("^1.2.3"), Some((1, 2, 3)));
        assert_eq!(parse_version("~0.10.0-rc1"), Some((0, 10, 0)));
        assert_eq!(parse_version("v2.x3.4"), Some((2, 3, 4)));
        assert_eq!(parse_version("^1.x"), None);
        assert_eq!(VersionRequirement::parse("^1.x"), VersionRequirement::Unknown("^1.x".into()));
    }

    #[test]
    fn missing_package_is_uninstalled() {
        let tmp = project(r#"{"dependencies": {"left-pad": "^1.0.0"}}"#);
        let report = check_dependencies(tmp.path()).unwrap();
        assert_eq!(report.manifest_dir, tmp.path());
        assert_eq!(report.uninstalled, BTreeSet::from(["left-pad".to_string()]));
        assert!(report.out_of_date.is_empty());
        assert!(report.needs_install());
    }

    #[test]
    fn satisfied_package_is_up_to_date() {
        let tmp = project(r#"{"dependencies": {"left-pad": "^1.0.0"}}"#);
        install(&tmp, "left-pad", Some(r#"{"name": "left-pad", "version": "1.3.0"}"#));
        let report = check_dependencies(tmp.path()).unwrap();
        assert!(report.uninstalled.is_empty());
        assert!(report.out_of_date.is_empty());
        assert!(!report.needs_install());
    }

    #[test]
    fn old_dev_dependency_is_out_of_date() {
        let tmp = project(
            r#"{
                "dependencies": {"gulp": "^4.0.0"},
                "devDependencies": {"karma": "~6.4.0", "gulp": "^4.0.0"}
            }"#,
        );
        install(&tmp, "karma", Some(r#"{"version": "6.3.9"}"#));
        install(&tmp, "gulp", Some(r#"{"version": "4.0.2"}"#));
        let report = check_dependencies(tmp.path()).unwrap();
        assert!(report.uninstalled.is_empty());
        assert_eq!(report.out_of_date, BTreeSet::from(["karma".to_string()]));
    }

    #[test]
    fn missing_or_broken_package_manifest_counts_as_up_to_date() {
        let tmp = project(r#"{"dependencies": {"bare": "1.0.0", "broken": "^2.0.0"}}"#);
        install(&tmp, "bare", None);
        install(&tmp, "broken", Some("not json"));
        let report = check_dependencies(tmp.path()).unwrap();
        assert!(!report.needs_install());
    }

    #[test]
    fn manifest_is_found_in_an_ancestor() {
        let tmp = project(r#"{"devDependencies": {"karma": "^6.0.0"}}"#);
        let nested = tmp.path().join("src").join("app");
        fs::create_dir_all(&nested).unwrap();
        let report = check_dependencies(&nested).unwrap();
        assert_eq!(report.manifest_dir, tmp.path());
        assert!(report.uninstalled.contains("karma"));
    }

    #[test]
    fn malformed_manifest_is_fatal() {
        let tmp = project("{ nope");
        let err = check_dependencies(tmp.path()).unwrap_err();
        assert!(matches!(err, JnsError::Manifest { .. }));
    }

    #[test]
    fn manifest_not_found_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("deep-0c41");
        fs::create_dir_all(&nested).unwrap();
        if find_file_up_hierarchy(&nested, PACKAGE_JSON).is_some() {
            return;
        }
        let err = check_dependencies(&nested).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn dry_run_never_installs() {
        let tmp = project(r#"{"dependencies": {"left-pad": "^1.0.0"}}"#);
        let report = check_dependencies(tmp.path()).unwrap();
        let installed = ensure_dependencies(&report, &["definitely-not-npm-9d2e".to_string()], true)
            .await
            .unwrap();
        assert!(!installed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn install_runs_in_manifest_dir_when_needed() {
        let tmp = project(r#"{"dependencies": {"left-pad": "^1.0.0"}}"#);
        let report = check_dependencies(tmp.path()).unwrap();
        let cmd = vec!["sh".to_string(), "-c".to_string(), "touch installed".to_string()];
        assert!(ensure_dependencies(&report, &cmd, false).await.unwrap());
        assert!(tmp.path().join("installed").exists());

        install(&tmp, "left-pad", Some(r#"{"version": "1.3.0"}"#));
        let report = check_dependencies(tmp.path()).unwrap();
        assert!(!ensure_dependencies(&report, &cmd, false).await.unwrap());
    }
}
