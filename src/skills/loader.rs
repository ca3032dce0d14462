//! Skill loader: resolves a source string to a validated [`Skill`].
//!
//! Resolution goes through the [`SkillCache`] so repeated assemblies of the
//! same agent hit memory, not the network.  Immutable sources (bundled
//! content, OCI digests) are cached forever; mutable refs expire after the
//! configured TTL.
//!
//! The Kubernetes API is an external collaborator — configmap content
//! arrives through the [`ConfigMapSource`] trait so tests and non-cluster
//! deployments can substitute their own backing.

use std::{collections::HashMap, io::Read, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use crate::skills::{
    cache::SkillCache,
    embedded::bundled_skills,
    error::{SkillError, SkillResult},
    source::{ACTIONS_KEY, DEFAULT_SKILL_KEY, OciReference, SkillSource},
    types::{Skill, ValidationReport},
};

/// Cap on the total bytes extracted from an OCI artifact.
pub const MAX_ARTIFACT_BYTES: u64 = 10 * 1024 * 1024;

/// Supplies configmap contents from the cluster (or a test fixture).
#[async_trait]
pub trait ConfigMapSource: Send + Sync {
    /// Fetch all keys of the named configmap in `namespace`.
    async fn fetch(&self, namespace: &str, name: &str) -> SkillResult<HashMap<String, String>>;
}

/// Resolves skill sources, backed by the shared TTL cache.
pub struct SkillLoader {
    cache: Arc<SkillCache>,
    configmaps: Option<Arc<dyn ConfigMapSource>>,
    http: reqwest::Client,
    /// TTL applied to mutable sources (branches, tags, configmaps).
    mutable_ttl: Duration,
}

impl SkillLoader {
    pub fn new(cache: Arc<SkillCache>) -> Self {
        Self {
            cache,
            configmaps: None,
            http: reqwest::Client::new(),
            mutable_ttl: Duration::from_secs(300),
        }
    }

    pub fn with_configmap_source(mut self, source: Arc<dyn ConfigMapSource>) -> Self {
        self.configmaps = Some(source);
        self
    }

    pub fn with_mutable_ttl(mut self, ttl: Duration) -> Self {
        self.mutable_ttl = ttl;
        self
    }

    /// Resolve `source` (grammar per [`SkillSource`]) for the named skill in
    /// the agent's namespace.  Warnings from validation are logged, not
    /// returned — only fatal defects fail resolution.
    pub async fn resolve(
        &self,
        skill_name: &str,
        source: &str,
        namespace: &str,
    ) -> SkillResult<Arc<Skill>> {
        let parsed = SkillSource::parse(source)?;
        let cache_key = match &parsed {
            SkillSource::Bundled => format!("bundled://{skill_name}"),
            SkillSource::ConfigMap { .. } => {
                format!("{namespace}/{}", parsed.cache_key())
            }
            _ => parsed.cache_key(),
        };
        let ttl = if parsed.is_immutable() {
            Duration::ZERO
        } else {
            self.mutable_ttl
        };

        let skill_name = skill_name.to_string();
        let namespace = namespace.to_string();
        self.cache
            .get_or_load(&cache_key, || async move {
                let (skill, report) = match &parsed {
                    SkillSource::Bundled => self.load_bundled(&skill_name)?,
                    SkillSource::ConfigMap { name, key } => {
                        self.load_configmap(&namespace, name, key).await?
                    }
                    SkillSource::Git {
                        host,
                        path,
                        subpath,
                        git_ref,
                    } => self.load_git(host, path, subpath, git_ref).await?,
                    SkillSource::Oci {
                        registry,
                        repo,
                        reference,
                    } => self.load_oci(registry, repo, reference).await?,
                };
                for warning in &report.warnings {
                    tracing::warn!(skill = %skill.name, "{warning}");
                }
                Ok((skill, ttl))
            })
            .await
    }

    // ── bundled ──────────────────────────────────────────────────────────────

    fn load_bundled(&self, name: &str) -> SkillResult<(Skill, ValidationReport)> {
        let registry = bundled_skills();
        let (md, actions) = registry
            .get(name)
            .ok_or_else(|| SkillError::NotFound(format!("bundled skill '{name}'")))?;
        Skill::parse(md, *actions)
    }

    // ── configmap ────────────────────────────────────────────────────────────

    async fn load_configmap(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> SkillResult<(Skill, ValidationReport)> {
        let source = self.configmaps.as_ref().ok_or_else(|| {
            SkillError::Fetch("no configmap source configured".to_string())
        })?;
        let data = source.fetch(namespace, name).await?;
        let skill_md = data.get(key).ok_or_else(|| {
            SkillError::NotFound(format!("configmap {namespace}/{name} has no key '{key}'"))
        })?;
        // The action sheet key is only consulted when the skill body uses the
        // default key; custom keys point at self-contained documents.
        let actions = if key == DEFAULT_SKILL_KEY {
            data.get(ACTIONS_KEY).map(String::as_str)
        } else {
            None
        };
        Skill::parse(skill_md, actions)
    }

    // ── git ──────────────────────────────────────────────────────────────────

    async fn load_git(
        &self,
        host: &str,
        path: &str,
        subpath: &str,
        git_ref: &str,
    ) -> SkillResult<(Skill, ValidationReport)> {
        let scratch = tempfile::TempDir::new()?;
        let checkout = scratch.path().join("repo");
        let url = format!("https://{host}/{path}.git");

        // Shallow clone at the ref; a ref that is a bare commit cannot be
        // cloned shallowly, so fall back to clone-then-checkout.
        let shallow = if git_ref.is_empty() {
            run_git(&["clone", "--depth", "1", &url], &checkout).await
        } else {
            run_git(&["clone", "--depth", "1", "--branch", git_ref, &url], &checkout).await
        };
        if let Err(shallow_err) = shallow {
            if git_ref.is_empty() {
                return Err(shallow_err);
            }
            tracing::debug!(%url, git_ref, "shallow clone failed, retrying with checkout");
            let _ = tokio::fs::remove_dir_all(&checkout).await;
            run_git(&["clone", &url], &checkout).await?;
            let output = Command::new("git")
                .arg("-C")
                .arg(&checkout)
                .args(["checkout", git_ref])
                .output()
                .await?;
            if !output.status.success() {
                return Err(SkillError::Fetch(format!(
                    "git checkout {git_ref} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }

        let skill_dir = if subpath.is_empty() {
            checkout.clone()
        } else {
            checkout.join(subpath)
        };
        read_skill_dir(&skill_dir).await
    }

    // ── oci ──────────────────────────────────────────────────────────────────

    async fn load_oci(
        &self,
        registry: &str,
        repo: &str,
        reference: &OciReference,
    ) -> SkillResult<(Skill, ValidationReport)> {
        let ref_str = match reference {
            OciReference::Tag(t) => t.clone(),
            OciReference::Digest(d) => d.clone(),
        };
        let manifest_url = format!("https://{registry}/v2/{repo}/manifests/{ref_str}");
        let manifest: serde_json::Value = self
            .http
            .get(&manifest_url)
            .header(
                "Accept",
                "application/vnd.oci.image.manifest.v1+json, \
                 application/vnd.docker.distribution.manifest.v2+json",
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let layers = manifest
            .get("layers")
            .and_then(|l| l.as_array())
            .ok_or_else(|| SkillError::Fetch(format!("manifest for {repo} has no layers")))?;
        if layers.len() != 1 {
            return Err(SkillError::Fetch(format!(
                "artifact {repo}@{ref_str} must have exactly one content layer, found {}",
                layers.len()
            )));
        }
        let digest = layers[0]
            .get("digest")
            .and_then(|d| d.as_str())
            .ok_or_else(|| SkillError::Fetch("layer missing digest".to_string()))?;
        if let Some(size) = layers[0].get("size").and_then(|s| s.as_u64()) {
            if size > MAX_ARTIFACT_BYTES {
                return Err(SkillError::TooLarge {
                    size,
                    cap: MAX_ARTIFACT_BYTES,
                });
            }
        }

        let blob_url = format!("https://{registry}/v2/{repo}/blobs/{digest}");
        let bytes = self
            .http
            .get(&blob_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if bytes.len() as u64 > MAX_ARTIFACT_BYTES {
            return Err(SkillError::TooLarge {
                size: bytes.len() as u64,
                cap: MAX_ARTIFACT_BYTES,
            });
        }

        let (skill_md, actions) = extract_artifact(&bytes)?;
        Skill::parse(&skill_md, actions.as_deref())
    }
}

/// Run `git <args> <dest>`, mapping failure to a fetch error.
async fn run_git(args: &[&str], dest: &Path) -> SkillResult<()> {
    let output = Command::new("git").args(args).arg(dest).output().await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(SkillError::Fetch(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or(""),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Read `SKILL.md` + optional `actions.yaml` from a checkout directory.
async fn read_skill_dir(dir: &Path) -> SkillResult<(Skill, ValidationReport)> {
    let skill_path = dir.join(DEFAULT_SKILL_KEY);
    let skill_md = tokio::fs::read_to_string(&skill_path)
        .await
        .map_err(|_| SkillError::NotFound(format!("{} not found", skill_path.display())))?;
    let actions = tokio::fs::read_to_string(dir.join(ACTIONS_KEY)).await.ok();
    Skill::parse(&skill_md, actions.as_deref())
}

/// Interpret an OCI content layer: a (possibly gzipped) tarball with
/// `SKILL.md` / `actions.yaml` at top level, or a plain `SKILL.md` body.
fn extract_artifact(bytes: &[u8]) -> SkillResult<(String, Option<String>)> {
    let tar_bytes: Vec<u8> = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoded = Vec::new();
        let mut gz = flate2::read::GzDecoder::new(bytes);
        let mut limited = gz.by_ref().take(MAX_ARTIFACT_BYTES + 1);
        limited.read_to_end(&mut decoded)?;
        if decoded.len() as u64 > MAX_ARTIFACT_BYTES {
            return Err(SkillError::TooLarge {
                size: decoded.len() as u64,
                cap: MAX_ARTIFACT_BYTES,
            });
        }
        decoded
    } else {
        bytes.to_vec()
    };

    if let Some(files) = read_tarball(&tar_bytes)? {
        let skill_md = files.get(DEFAULT_SKILL_KEY).cloned().ok_or_else(|| {
            SkillError::NotFound("artifact tarball has no top-level SKILL.md".to_string())
        })?;
        return Ok((skill_md, files.get(ACTIONS_KEY).cloned()));
    }

    // Not a tarball: the layer is the skill body itself.
    let text = String::from_utf8(tar_bytes)
        .map_err(|_| SkillError::Parse("artifact layer is not UTF-8".to_string()))?;
    Ok((text, None))
}

/// Returns `Ok(None)` when the bytes are not a tar archive.
fn read_tarball(bytes: &[u8]) -> SkillResult<Option<HashMap<String, String>>> {
    // A tar header block is 512 bytes with "ustar" magic at offset 257.
    if bytes.len() < 512 || &bytes[257..262] != b"ustar" {
        return Ok(None);
    }
    let mut archive = tar::Archive::new(bytes);
    let mut files = HashMap::new();
    let mut total: u64 = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        total += entry.size();
        if total > MAX_ARTIFACT_BYTES {
            return Err(SkillError::TooLarge {
                size: total,
                cap: MAX_ARTIFACT_BYTES,
            });
        }
        let path = entry.path()?.to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        // Only top-level entries count.
        if path.components().count() > 1 && !path.starts_with("./") {
            continue;
        }
        if name == DEFAULT_SKILL_KEY || name == ACTIONS_KEY {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            files.insert(name, content);
        }
    }
    Ok(Some(files))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureConfigMaps(HashMap<String, String>);

    #[async_trait]
    impl ConfigMapSource for FixtureConfigMaps {
        async fn fetch(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> SkillResult<HashMap<String, String>> {
            Ok(self.0.clone())
        }
    }

    const SKILL_MD: &str = "---\nname: cm-skill\ndescription: from a configmap\nversion: 1.0.0\nlicense: MIT\ntags: [test]\n---\nDo the thing.";

    fn loader_with_fixture(data: HashMap<String, String>) -> SkillLoader {
        SkillLoader::new(Arc::new(SkillCache::default()))
            .with_configmap_source(Arc::new(FixtureConfigMaps(data)))
    }

    #[tokio::test]
    async fn resolves_bundled_skill() {
        let loader = SkillLoader::new(Arc::new(SkillCache::default()));
        let skill = loader
            .resolve("cluster-health", "bundled", "default")
            .await
            .unwrap();
        assert_eq!(skill.name, "cluster-health");
        assert!(skill.action_sheet.is_some());
    }

    #[tokio::test]
    async fn unknown_bundled_skill_not_found() {
        let loader = SkillLoader::new(Arc::new(SkillCache::default()));
        let err = loader.resolve("no-such", "bundled", "default").await;
        assert!(matches!(err, Err(SkillError::NotFound(_))));
    }

    #[tokio::test]
    async fn resolves_configmap_skill_with_actions() {
        let mut data = HashMap::new();
        data.insert("SKILL.md".to_string(), SKILL_MD.to_string());
        data.insert(
            "actions.yaml".to_string(),
            "- id: a\n  tool: kubectl.get\n  tier: read\n".to_string(),
        );
        let loader = loader_with_fixture(data);
        let skill = loader
            .resolve("cm-skill", "configmap://cm-skill", "team-a")
            .await
            .unwrap();
        assert_eq!(skill.name, "cm-skill");
        assert_eq!(skill.action_sheet.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn configmap_missing_key_errors() {
        let loader = loader_with_fixture(HashMap::new());
        let err = loader
            .resolve("cm-skill", "configmap://cm-skill", "team-a")
            .await;
        assert!(matches!(err, Err(SkillError::NotFound(_))));
    }

    #[tokio::test]
    async fn second_resolve_hits_cache() {
        let cache = Arc::new(SkillCache::default());
        let loader = SkillLoader::new(cache.clone());
        loader
            .resolve("cluster-health", "bundled", "default")
            .await
            .unwrap();
        assert_eq!(cache.size(), 1);
        // Bundled entries never expire.
        assert_eq!(cache.clean_expired(), 0);
    }

    #[test]
    fn extract_plain_skill_md() {
        let (md, actions) = extract_artifact(SKILL_MD.as_bytes()).unwrap();
        assert!(md.contains("cm-skill"));
        assert!(actions.is_none());
    }

    #[test]
    fn extract_tarball_with_skill_and_actions() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut add = |name: &str, content: &str| {
            let mut header = tar::Header::new_ustar();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        };
        add("SKILL.md", SKILL_MD);
        add("actions.yaml", "- id: a\n  tool: t\n");
        let bytes = builder.into_inner().unwrap();

        let (md, actions) = extract_artifact(&bytes).unwrap();
        assert!(md.contains("from a configmap"));
        assert!(actions.unwrap().contains("id: a"));
    }

    #[test]
    fn extract_gzipped_tarball() {
        use flate2::{Compression, write::GzEncoder};
        use std::io::Write;

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_size(SKILL_MD.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "SKILL.md", SKILL_MD.as_bytes())
            .unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        let gzipped = gz.finish().unwrap();

        let (md, _) = extract_artifact(&gzipped).unwrap();
        assert!(md.contains("cm-skill"));
    }

    #[test]
    fn tarball_without_skill_md_errors() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "other.txt", &b"hi"[..]).unwrap();
        let bytes = builder.into_inner().unwrap();
        assert!(matches!(
            extract_artifact(&bytes),
            Err(SkillError::NotFound(_))
        ));
    }
}
