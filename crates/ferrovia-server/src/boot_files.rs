//! Boot file resolution for TFTP
//!
//! The requesting host is identified by the source address of the transfer.
//! The boot loader and crypto module are taken from the host's image, boot.cfg
//! is generated per host, everything else is served from the images root.

use async_trait::async_trait;
use bytes::Bytes;
use ferrovia_boot::{patch_boot_cfg, BootConfigContext};
use ferrovia_common::{netmask_from_prefix, present, HostRecord, Stage};
use ferrovia_tftp::{BootFile, BootRequest, FileProvider, TftpError};
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::store::HostStore;

/// Boot loader locations inside an image, first match wins
pub const MBOOT_PATHS: [&str; 6] = [
    "EFI/BOOT/BOOTX64.EFI",
    "EFI/BOOT/BOOTAA64.EFI",
    "MBOOT.EFI",
    "mboot.efi",
    "efi/boot/bootx64.efi",
    "efi/boot/bootaa64.efi",
];

pub const CRYPTO64_PATHS: [&str; 2] = ["EFI/BOOT/CRYPTO64.EFI", "efi/boot/crypto64.efi"];

/// How the kickstart URL written into boot.cfg is built
#[derive(Debug, Clone)]
pub struct KickstartEndpoint {
    pub scheme: String,
    pub port: u16,
}

impl KickstartEndpoint {
    /// URL of ks.cfg on the server address the host reached us on
    pub fn url(&self, server: IpAddr) -> String {
        format!("{}://{}/ks.cfg", self.scheme, SocketAddr::new(server, self.port))
    }
}

/// [`FileProvider`] that resolves requests against host state
pub struct BootFileProvider {
    store: Arc<dyn HostStore>,
    images_root: PathBuf,
    kickstart: KickstartEndpoint,
}

impl BootFileProvider {
    pub fn new(store: Arc<dyn HostStore>, images_root: impl Into<PathBuf>, kickstart: KickstartEndpoint) -> Self {
        Self {
            store,
            images_root: images_root.into(),
            kickstart,
        }
    }

    async fn host_for(&self, request: &BootRequest) -> Result<HostRecord, TftpError> {
        let ip = request.remote_ip().to_string();
        self.store
            .host_by_ip(&ip)
            .await
            .map_err(|e| TftpError::AccessDenied(format!("host lookup for {} failed: {}", ip, e)))?
            .ok_or_else(|| TftpError::AccessDenied(format!("no host registered for {}", ip)))
    }

    async fn advance(&self, record: &HostRecord, stage: Stage) -> Result<(), TftpError> {
        self.store
            .save_progress(record.host.id, stage)
            .await
            .map_err(|e| TftpError::AccessDenied(format!("failed to save progress: {}", e)))?;
        info!(
            host_id = record.host.id,
            progress = stage.percent(),
            stage = stage.label(),
            "Host progress updated"
        );
        Ok(())
    }

    async fn boot_cfg(&self, record: &HostRecord, request: &BootRequest) -> Result<BootFile, TftpError> {
        let source = record.image.path.join("BOOT.CFG");
        let raw = tokio::fs::read(&source).await.map_err(|e| {
            warn!(path = %source.display(), error = %e, "Failed to read boot.cfg from image");
            if e.kind() == std::io::ErrorKind::NotFound {
                TftpError::FileNotFound(source.display().to_string())
            } else {
                TftpError::IoError(e)
            }
        })?;

        let group = &record.group;
        let options = group
            .parsed_options()
            .map_err(|e| TftpError::AccessDenied(e.to_string()))?;
        let netmask = netmask_from_prefix(record.pool.netmask)
            .map_err(|e| TftpError::AccessDenied(e.to_string()))?;

        let ctx = BootConfigContext {
            kickstart_url: self.kickstart.url(request.local),
            mac: record.host.mac.clone(),
            ip: record.host.ip.clone(),
            netmask: netmask.to_string(),
            gateway: record.pool.gateway.clone(),
            vlan: present(&group.vlan).map(str::to_string),
            allow_legacy_cpu: options.allow_legacy_cpu,
            prefix: record.image.leaf_dir(),
        };
        let patched = patch_boot_cfg(&raw, &ctx).map_err(|e| {
            warn!(path = %source.display(), error = %e, "Failed to patch boot.cfg");
            TftpError::AccessDenied(e.to_string())
        })?;
        Ok(BootFile::Buffer(Bytes::from(patched)))
    }

    /// `images/<path>`, then the same directory with the file name upper-cased
    async fn media_file(&self, filename: &str) -> Result<BootFile, TftpError> {
        let relative = sanitize(filename)?;
        let direct = self.images_root.join(&relative);
        if tokio::fs::metadata(&direct).await.is_ok() {
            debug!(path = %direct.display(), "Serving media file");
            return BootFile::from_path(direct).await;
        }

        let upper = match relative.file_name() {
            Some(name) => relative.with_file_name(name.to_string_lossy().to_uppercase()),
            None => return Err(TftpError::FileNotFound(filename.to_string())),
        };
        let fallback = self.images_root.join(upper);
        debug!(path = %fallback.display(), "Serving upper-cased media file");
        BootFile::from_path(fallback).await
    }
}

/// First candidate that exists as a file under `root`
async fn probe(root: &Path, candidates: &[&str]) -> Option<PathBuf> {
    for candidate in candidates {
        let path = root.join(candidate);
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() {
                return Some(path);
            }
        }
    }
    None
}

/// Strip leading `/` and refuse paths that would climb out of the root
fn sanitize(filename: &str) -> Result<PathBuf, TftpError> {
    let path = Path::new(filename.trim_start_matches('/'));
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(TftpError::AccessDenied(format!("illegal path: {}", filename))),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(TftpError::FileNotFound(filename.to_string()));
    }
    Ok(clean)
}

#[async_trait]
impl FileProvider for BootFileProvider {
    async fn open(&self, request: &BootRequest) -> Result<BootFile, TftpError> {
        debug!(client = %request.remote, local = %request.local, filename = %request.filename, "Resolving boot file");

        let (file, record, stage) = match request.filename.as_str() {
            "mboot.efi" | "crypto64.efi" => {
                let record = self.host_for(request).await?;
                let (candidates, stage) = if request.filename == "mboot.efi" {
                    (&MBOOT_PATHS[..], Stage::MbootEfi)
                } else {
                    (&CRYPTO64_PATHS[..], Stage::Crypto64Efi)
                };
                let path = probe(&record.image.path, candidates).await.ok_or_else(|| {
                    TftpError::FileNotFound(format!(
                        "could not locate {} in {}",
                        request.filename,
                        record.image.path.display()
                    ))
                })?;
                (BootFile::from_path(path).await?, record, stage)
            }
            "boot.cfg" | "/boot.cfg" => {
                let record = self.host_for(request).await?;
                let file = self.boot_cfg(&record, request).await?;
                (file, record, Stage::Installation)
            }
            other => return self.media_file(other).await,
        };

        self.advance(&record, stage).await?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use ferrovia_common::{Group, Host, Image, Pool};
    use tempfile::TempDir;

    const BOOT_CFG: &str = "bootstate=0\nprefix=\nkernel=/b.b00\nkernelopt=runweasel\nmodules=/jumpstrt.gz --- /useropts.gz\n";

    struct Fixture {
        _dir: TempDir,
        images: PathBuf,
        image: PathBuf,
        store: Arc<MemoryStore>,
        provider: BootFileProvider,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        let image = images.join("ESXi-8.0U2");
        std::fs::create_dir_all(&image).unwrap();

        let store = MemoryStore::new();
        store
            .put_pool(Pool {
                id: 1,
                name: "lab".to_string(),
                net_address: "10.0.0.0".to_string(),
                netmask: 24,
                gateway: "10.0.0.1".to_string(),
                start_address: "10.0.0.10".to_string(),
                end_address: "10.0.0.50".to_string(),
                dhcp_relay: None,
            })
            .unwrap();
        store
            .put_image(Image {
                id: 1,
                name: "esxi".to_string(),
                path: image.clone(),
            })
            .unwrap();
        store
            .put_group(Group {
                id: 1,
                image_id: 1,
                vlan: Some("100".to_string()),
                options: r#"{"allowlegacycpu":true}"#.to_string(),
                ..Default::default()
            })
            .unwrap();
        store
            .register_host(Host {
                id: 7,
                ip: "10.0.0.25".to_string(),
                mac: "00:11:22:33:44:55".to_string(),
                hostname: "esx01".to_string(),
                domain: "lab.local".to_string(),
                pool_id: 1,
                group_id: 1,
                progress: 0,
                progress_text: String::new(),
                reimage: true,
                ks: None,
            })
            .unwrap();

        let store = Arc::new(store);
        let provider = BootFileProvider::new(
            store.clone(),
            &images,
            KickstartEndpoint {
                scheme: "https".to_string(),
                port: 8443,
            },
        );
        Fixture {
            _dir: dir,
            images,
            image,
            store,
            provider,
        }
    }

    fn request(filename: &str) -> BootRequest {
        BootRequest {
            remote: "10.0.0.25:2070".parse().unwrap(),
            filename: filename.to_string(),
            local: IpAddr::from([10, 0, 0, 2]),
        }
    }

    fn write(path: &Path, content: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn progress(store: &MemoryStore) -> (u8, String) {
        let record = store.host_by_id(7).await.unwrap().unwrap();
        (record.host.progress, record.host.progress_text)
    }

    #[tokio::test]
    async fn test_mboot_probes_lowercase_path() {
        let f = fixture();
        write(&f.image.join("efi/boot/bootx64.efi"), b"loader");

        let file = f.provider.open(&request("mboot.efi")).await.unwrap();
        assert_eq!(
            file,
            BootFile::File {
                path: f.image.join("efi/boot/bootx64.efi"),
                size: 6
            }
        );
        assert_eq!(progress(&f.store).await, (10, "mboot.efi".to_string()));
    }

    #[tokio::test]
    async fn test_mboot_prefers_uppercase_path() {
        let f = fixture();
        write(&f.image.join("efi/boot/bootx64.efi"), b"lower");
        write(&f.image.join("EFI/BOOT/BOOTX64.EFI"), b"upper!");

        let file = f.provider.open(&request("mboot.efi")).await.unwrap();
        assert_eq!(file.size(), 6);
    }

    #[tokio::test]
    async fn test_missing_mboot_leaves_progress() {
        let f = fixture();
        let err = f.provider.open(&request("mboot.efi")).await.unwrap_err();
        assert!(matches!(err, TftpError::FileNotFound(_)));
        assert_eq!(progress(&f.store).await, (0, String::new()));
    }

    #[tokio::test]
    async fn test_crypto64() {
        let f = fixture();
        write(&f.image.join("EFI/BOOT/CRYPTO64.EFI"), b"crypto");

        let file = f.provider.open(&request("crypto64.efi")).await.unwrap();
        assert_eq!(file.size(), 6);
        assert_eq!(progress(&f.store).await, (12, "crypto64.efi".to_string()));
    }

    #[tokio::test]
    async fn test_boot_cfg_is_patched() {
        let f = fixture();
        write(&f.image.join("BOOT.CFG"), BOOT_CFG.as_bytes());

        for name in ["boot.cfg", "/boot.cfg"] {
            let file = f.provider.open(&request(name)).await.unwrap();
            let data = match file {
                BootFile::Buffer(data) => data,
                other => panic!("expected generated boot.cfg, got {:?}", other),
            };
            let text = String::from_utf8(data.to_vec()).unwrap();
            assert!(text.contains(
                "kernelopt=runweasel ks=https://10.0.0.2:8443/ks.cfg \
                 netdevice=00:11:22:33:44:55 ip=10.0.0.25 netmask=255.255.255.0 gateway=10.0.0.1 \
                 vlanid=100 allowLegacyCPU=true\n"
            ));
            assert!(text.contains("prefix=ESXi-8.0U2\n"));
            assert!(text.contains("kernel=b.b00\n"));
        }
        assert_eq!(progress(&f.store).await, (15, "installation".to_string()));
    }

    #[tokio::test]
    async fn test_boot_cfg_missing_source() {
        let f = fixture();
        let err = f.provider.open(&request("boot.cfg")).await.unwrap_err();
        assert!(matches!(err, TftpError::FileNotFound(_)));
        assert_eq!(progress(&f.store).await.0, 0);
    }

    #[tokio::test]
    async fn test_unknown_host_denied() {
        let f = fixture();
        let mut req = request("boot.cfg");
        req.remote = "10.0.0.99:2070".parse().unwrap();
        let err = f.provider.open(&req).await.unwrap_err();
        assert!(matches!(err, TftpError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_media_file_uppercase_fallback() {
        let f = fixture();
        write(&f.image.join("B.B00"), b"kernel");

        let file = f.provider.open(&request("ESXi-8.0U2/b.b00")).await.unwrap();
        assert_eq!(file.size(), 6);
        // Plain media never moves progress
        assert_eq!(progress(&f.store).await.0, 0);
    }

    #[tokio::test]
    async fn test_media_file_direct() {
        let f = fixture();
        write(&f.images.join("ESXi-8.0U2/s.v00"), b"module");

        let file = f.provider.open(&request("/ESXi-8.0U2/s.v00")).await.unwrap();
        assert_eq!(file.size(), 6);
    }

    #[tokio::test]
    async fn test_unknown_file_fails_without_progress() {
        let f = fixture();
        let err = f.provider.open(&request("nothing/here.bin")).await.unwrap_err();
        assert!(matches!(err, TftpError::FileNotFound(_)));
        assert_eq!(progress(&f.store).await.0, 0);
    }

    #[tokio::test]
    async fn test_parent_dir_rejected() {
        let f = fixture();
        let err = f.provider.open(&request("../etc/passwd")).await.unwrap_err();
        assert!(matches!(err, TftpError::AccessDenied(_)));
    }

    #[test]
    fn test_kickstart_url() {
        let endpoint = KickstartEndpoint {
            scheme: "https".to_string(),
            port: 443,
        };
        assert_eq!(endpoint.url(IpAddr::from([10, 0, 0, 2])), "https://10.0.0.2:443/ks.cfg");
    }

    #[test]
    fn test_kickstart_url_brackets_ipv6() {
        let endpoint = KickstartEndpoint {
            scheme: "http".to_string(),
            port: 8443,
        };
        let server: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(endpoint.url(server), "http://[fe80::1]:8443/ks.cfg");
    }
}
