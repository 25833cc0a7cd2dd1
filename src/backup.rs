use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Workspace database file; `db::DB_FILE_NAME` is defined from this.
pub const DB_FILE_NAME: &str = "notenbuch.sqlite3";
const IMPORT_TMP_NAME: &str = "notenbuch.sqlite3.importing";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/notenbuch.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
pub const BUNDLE_FORMAT_V1: &str = "notenbuch-workspace-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

/// `manifest.json`. Only `format` is required on import; older or
/// hand-made bundles may lack the rest.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    format: String,
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exported_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    db_sha256: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceMeta {
    source_workspace: String,
    db_file: &'static str,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

struct BundleWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    entries: usize,
}

impl<W: Write + Seek> BundleWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            entries: 0,
        }
    }

    fn entry(&mut self, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip
            .start_file(name, opts)
            .with_context(|| format!("failed to start bundle entry {}", name))?;
        self.zip
            .write_all(bytes)
            .with_context(|| format!("failed to write bundle entry {}", name))?;
        self.entries += 1;
        Ok(())
    }

    fn json_entry(&mut self, name: &str, value: &impl Serialize) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to serialize {}", name))?;
        self.entry(name, text.as_bytes())
    }

    fn finish(mut self) -> anyhow::Result<usize> {
        self.zip.finish().context("failed to finalize zip bundle")?;
        Ok(self.entries)
    }
}

/// Packs the workspace database into a zip bundle at `out_path`.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.to_string_lossy());
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;

    let mut bundle = BundleWriter::new(out_file);
    bundle.json_entry(
        MANIFEST_ENTRY,
        &Manifest {
            format: BUNDLE_FORMAT_V1.to_string(),
            version: 1,
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            exported_at: Some(chrono::Utc::now().to_rfc3339()),
            db_sha256: Some(db_sha256.clone()),
        },
    )?;
    bundle.entry(DB_ENTRY, &db_bytes)?;
    bundle.json_entry(
        META_WORKSPACE_ENTRY,
        &WorkspaceMeta {
            source_workspace: workspace_path.to_string_lossy().to_string(),
            db_file: DB_FILE_NAME,
        },
    )?;
    let entry_count = bundle.finish()?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count,
        db_sha256,
    })
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle missing {}", name))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to extract {}", name))?;
    Ok(bytes)
}

/// Checks the manifest and returns the verified database bytes.
fn unpack_database(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
        .context("manifest.json is invalid JSON")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
    if let Some(expected) = manifest.db_sha256.as_deref() {
        let actual = sha256_hex(&db_bytes);
        if actual != expected {
            return Err(anyhow!(
                "database checksum mismatch: manifest {} but bundle contains {}",
                expected,
                actual
            ));
        }
    }
    Ok(db_bytes)
}

/// Writes next to `dst` first so a failed write never leaves a truncated
/// database behind.
fn install_database(workspace_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp = workspace_path.join(IMPORT_TMP_NAME);
    {
        let mut out = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
        out.write_all(bytes)
            .and_then(|_| out.sync_all())
            .context("failed to write restored database")?;
    }
    if dst.exists() {
        std::fs::remove_file(&dst)
            .with_context(|| format!("failed to remove {}", dst.to_string_lossy()))?;
    }
    std::fs::rename(&tmp, &dst)
        .with_context(|| format!("failed to move restored database to {}", dst.to_string_lossy()))
}

/// Backup contents that passed every check and can replace a workspace
/// database.
#[derive(Debug)]
pub struct VerifiedBackup {
    bytes: Vec<u8>,
    format: &'static str,
}

impl VerifiedBackup {
    pub fn format(&self) -> &'static str {
        self.format
    }

    pub fn install(self, workspace_path: &Path) -> anyhow::Result<ImportSummary> {
        std::fs::create_dir_all(workspace_path).with_context(|| {
            format!("failed to create workspace {}", workspace_path.to_string_lossy())
        })?;
        install_database(workspace_path, &self.bytes)?;
        Ok(ImportSummary {
            bundle_format_detected: self.format.to_string(),
        })
    }
}

/// Reads and verifies a backup without touching any workspace. A bare
/// sqlite file is taken as a legacy backup.
pub fn read_backup(in_path: &Path) -> anyhow::Result<VerifiedBackup> {
    if is_zip_file(in_path)? {
        return Ok(VerifiedBackup {
            bytes: unpack_database(in_path)?,
            format: BUNDLE_FORMAT_V1,
        });
    }
    let bytes = std::fs::read(in_path)
        .with_context(|| format!("failed to read backup {}", in_path.to_string_lossy()))?;
    Ok(VerifiedBackup {
        bytes,
        format: LEGACY_SQLITE_FORMAT,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    match f.read_exact(&mut sig) {
        Ok(()) => Ok(sig == ZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).context("failed to read file signature"),
    }
}
