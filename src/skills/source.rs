//! Skill source grammar.
//!
//! ```text
//! bundled
//! configmap://<name>[/<key>]
//! git://<host>/<path>[#<subpath>][@<ref>]
//! oci://<registry>/<repo>{:tag|@digest}
//! ```
//!
//! The grammar is an external contract; parsing must accept exactly these
//! shapes and nothing else.

use serde::{Deserialize, Serialize};

use crate::skills::error::{SkillError, SkillResult};

/// Default configmap key holding the skill body.
pub const DEFAULT_SKILL_KEY: &str = "SKILL.md";

/// Configmap / artifact key holding the action sheet.
pub const ACTIONS_KEY: &str = "actions.yaml";

/// A parsed skill source reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SkillSource {
    /// Embedded skill registry compiled into the binary.
    Bundled,
    /// Kubernetes configmap in the agent's namespace.
    ConfigMap { name: String, key: String },
    /// Shallow git clone at a ref (or the default branch).
    Git {
        host: String,
        path: String,
        subpath: String,
        /// Branch, tag, or commit; empty means the default branch.
        git_ref: String,
    },
    /// OCI artifact pulled from a registry.
    Oci {
        registry: String,
        repo: String,
        /// `:tag` or `@digest`, whichever the reference carried.
        reference: OciReference,
    },
}

/// Tag or digest half of an OCI reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OciReference {
    Tag(String),
    Digest(String),
}

impl SkillSource {
    /// Parse a source string per the grammar.
    pub fn parse(source: &str) -> SkillResult<Self> {
        let source = source.trim();
        if source == "bundled" {
            return Ok(SkillSource::Bundled);
        }
        if let Some(rest) = source.strip_prefix("configmap://") {
            return Self::parse_configmap(rest);
        }
        if let Some(rest) = source.strip_prefix("git://") {
            return Self::parse_git(rest);
        }
        if let Some(rest) = source.strip_prefix("oci://") {
            return Self::parse_oci(rest);
        }
        Err(SkillError::UnsupportedSource(source.to_string()))
    }

    fn parse_configmap(rest: &str) -> SkillResult<Self> {
        if rest.is_empty() {
            return Err(SkillError::UnsupportedSource(
                "configmap:// requires a name".to_string(),
            ));
        }
        let (name, key) = match rest.split_once('/') {
            Some((name, key)) if !key.is_empty() => (name, key),
            Some((name, _)) => (name, DEFAULT_SKILL_KEY),
            None => (rest, DEFAULT_SKILL_KEY),
        };
        Ok(SkillSource::ConfigMap {
            name: name.to_string(),
            key: key.to_string(),
        })
    }

    fn parse_git(rest: &str) -> SkillResult<Self> {
        // `<host>/<path>[#<subpath>][@<ref>]` — the ref may trail either the
        // subpath fragment or, when no fragment is present, the path itself.
        let (url_part, fragment) = match rest.split_once('#') {
            Some((u, f)) => (u, Some(f)),
            None => (rest, None),
        };

        let (url_part, subpath, git_ref) = match fragment {
            Some(frag) => match frag.rsplit_once('@') {
                Some((sub, r)) => (url_part, sub.to_string(), r.to_string()),
                None => (url_part, frag.to_string(), String::new()),
            },
            None => match url_part.rsplit_once('@') {
                Some((u, r)) => (u, String::new(), r.to_string()),
                None => (url_part, String::new(), String::new()),
            },
        };

        let (host, path) = url_part.split_once('/').ok_or_else(|| {
            SkillError::UnsupportedSource(format!("git source missing path: git://{rest}"))
        })?;
        if host.is_empty() || path.is_empty() {
            return Err(SkillError::UnsupportedSource(format!(
                "git source missing host or path: git://{rest}"
            )));
        }
        Ok(SkillSource::Git {
            host: host.to_string(),
            path: path.to_string(),
            subpath,
            git_ref,
        })
    }

    fn parse_oci(rest: &str) -> SkillResult<Self> {
        let (registry, remainder) = rest.split_once('/').ok_or_else(|| {
            SkillError::UnsupportedSource(format!("oci source missing repo: oci://{rest}"))
        })?;

        // Digest references use `@`, tag references use the last `:` after
        // the final path segment (registries may carry a `:port`).
        if let Some((repo, digest)) = remainder.split_once('@') {
            if repo.is_empty() || digest.is_empty() {
                return Err(SkillError::UnsupportedSource(format!("oci://{rest}")));
            }
            return Ok(SkillSource::Oci {
                registry: registry.to_string(),
                repo: repo.to_string(),
                reference: OciReference::Digest(digest.to_string()),
            });
        }

        let (repo, tag) = match remainder.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag.to_string()),
            _ => (remainder, "latest".to_string()),
        };
        if repo.is_empty() {
            return Err(SkillError::UnsupportedSource(format!("oci://{rest}")));
        }
        Ok(SkillSource::Oci {
            registry: registry.to_string(),
            repo: repo.to_string(),
            reference: OciReference::Tag(tag),
        })
    }

    /// Stable cache key for this source.  For git: URL + subpath + ref; for
    /// OCI: the full reference including digest.  Callers namespace-qualify
    /// configmap keys.
    pub fn cache_key(&self) -> String {
        match self {
            SkillSource::Bundled => "bundled".to_string(),
            SkillSource::ConfigMap { name, key } => format!("configmap://{name}/{key}"),
            SkillSource::Git {
                host,
                path,
                subpath,
                git_ref,
            } => format!("git://{host}/{path}#{subpath}@{git_ref}"),
            SkillSource::Oci {
                registry,
                repo,
                reference,
            } => match reference {
                OciReference::Tag(t) => format!("oci://{registry}/{repo}:{t}"),
                OciReference::Digest(d) => format!("oci://{registry}/{repo}@{d}"),
            },
        }
    }

    /// Digests and pinned content never change; mutable refs must expire.
    pub fn is_immutable(&self) -> bool {
        matches!(
            self,
            SkillSource::Bundled
                | SkillSource::Oci {
                    reference: OciReference::Digest(_),
                    ..
                }
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_parses() {
        assert_eq!(SkillSource::parse("bundled").unwrap(), SkillSource::Bundled);
    }

    #[test]
    fn configmap_default_key() {
        let s = SkillSource::parse("configmap://pod-watch").unwrap();
        assert_eq!(
            s,
            SkillSource::ConfigMap {
                name: "pod-watch".to_string(),
                key: "SKILL.md".to_string()
            }
        );
    }

    #[test]
    fn configmap_explicit_key() {
        let s = SkillSource::parse("configmap://pod-watch/custom.md").unwrap();
        assert_eq!(
            s,
            SkillSource::ConfigMap {
                name: "pod-watch".to_string(),
                key: "custom.md".to_string()
            }
        );
    }

    #[test]
    fn git_full_form() {
        let s = SkillSource::parse("git://github.com/acme/skills#k8s/pod-watch@v1.2").unwrap();
        assert_eq!(
            s,
            SkillSource::Git {
                host: "github.com".to_string(),
                path: "acme/skills".to_string(),
                subpath: "k8s/pod-watch".to_string(),
                git_ref: "v1.2".to_string()
            }
        );
    }

    #[test]
    fn git_without_fragment_takes_trailing_ref() {
        let s = SkillSource::parse("git://github.com/acme/skills@main").unwrap();
        assert_eq!(
            s,
            SkillSource::Git {
                host: "github.com".to_string(),
                path: "acme/skills".to_string(),
                subpath: String::new(),
                git_ref: "main".to_string()
            }
        );
    }

    #[test]
    fn git_bare() {
        let s = SkillSource::parse("git://github.com/acme/skills").unwrap();
        match s {
            SkillSource::Git { subpath, git_ref, .. } => {
                assert!(subpath.is_empty());
                assert!(git_ref.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn oci_tag() {
        let s = SkillSource::parse("oci://ghcr.io/acme/skills:2024.1").unwrap();
        assert_eq!(
            s,
            SkillSource::Oci {
                registry: "ghcr.io".to_string(),
                repo: "acme/skills".to_string(),
                reference: OciReference::Tag("2024.1".to_string())
            }
        );
    }

    #[test]
    fn oci_digest() {
        let s = SkillSource::parse("oci://ghcr.io/acme/skills@sha256:abc123").unwrap();
        match &s {
            SkillSource::Oci { reference, .. } => {
                assert_eq!(reference, &OciReference::Digest("sha256:abc123".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(s.is_immutable());
    }

    #[test]
    fn oci_untagged_defaults_to_latest() {
        let s = SkillSource::parse("oci://ghcr.io/acme/skills").unwrap();
        assert_eq!(
            s,
            SkillSource::Oci {
                registry: "ghcr.io".to_string(),
                repo: "acme/skills".to_string(),
                reference: OciReference::Tag("latest".to_string())
            }
        );
        assert!(!s.is_immutable());
    }

    #[test]
    fn unknown_scheme_is_rejected(){
        assert!(SkillSource::parse("s3://bucket/key").is_err());
        assert!(SkillSource::parse("").is_err());
    }

    #[test]
    fn cache_key_round_trips_git_components() {
        let s = SkillSource::parse("git://github.com/acme/skills#sub@v2").unwrap();
        assert_eq!(s.cache_key(), "git://github.com/acme/skills#sub@v2");
    }
}
