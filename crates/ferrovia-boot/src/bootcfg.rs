//! ESXi boot.cfg patching
//!
//! boot.cfg is a line-oriented `key=value` file. The installer reads its
//! kernel command line from `kernelopt=` and the module directory from
//! `prefix=`. We strip every `/` (module paths become relative to `prefix`),
//! extend `kernelopt` with the kickstart URL and static network settings,
//! and point `prefix` at the image directory.

use crate::error::{BootError, Result};
use tracing::debug;

/// Host specific values injected into boot.cfg
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootConfigContext {
    /// Full kickstart URL, e.g. `https://10.0.0.2:8443/ks.cfg`
    pub kickstart_url: String,
    pub mac: String,
    pub ip: String,
    /// Dotted-quad netmask
    pub netmask: String,
    pub gateway: String,
    pub vlan: Option<String>,
    pub allow_legacy_cpu: bool,
    /// Image leaf directory, written as the `prefix=` value
    pub prefix: String,
}

/// One line of a boot.cfg file, split on its first `=`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    key: Option<String>,
    value: String,
    /// Original line terminator (`\n`, `\r\n` or empty on the last line)
    ending: String,
}

impl Line {
    fn parse(raw: &str) -> Self {
        let (body, ending) = match raw.strip_suffix("\r\n") {
            Some(body) => (body, "\r\n"),
            None => match raw.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (raw, ""),
            },
        };

        match body.split_once('=') {
            Some((key, value)) => Line {
                key: Some(key.to_string()),
                value: value.to_string(),
                ending: ending.to_string(),
            },
            None => Line {
                key: None,
                value: body.to_string(),
                ending: ending.to_string(),
            },
        }
    }

    fn write(&self, out: &mut String) {
        if let Some(key) = &self.key {
            out.push_str(key);
            out.push('=');
        }
        out.push_str(&self.value);
        out.push_str(&self.ending);
    }
}

/// A parsed boot.cfg that writes back byte-for-byte except for edited values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    lines: Vec<Line>,
}

impl BootConfig {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(Line::parse).collect(),
        }
    }

    /// Value of the first line with `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|l| l.key.as_deref() == Some(key))
            .map(|l| l.value.as_str())
    }

    /// Replace the value of every line with `key`; returns how many matched
    pub fn set(&mut self, key: &str, value: &str) -> usize {
        let mut matched = 0;
        for line in self.lines.iter_mut().filter(|l| l.key.as_deref() == Some(key)) {
            line.value = value.to_string();
            matched += 1;
        }
        matched
    }

    /// Append ` <arg>` to the `kernelopt` value
    pub fn append_kernelopt(&mut self, arg: &str) -> Result<()> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.key.as_deref() == Some("kernelopt"))
            .ok_or(BootError::MissingKernelopt)?;
        if !line.value.is_empty() {
            line.value.push(' ');
        }
        line.value.push_str(arg);
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            line.write(&mut out);
        }
        out
    }
}

/// Patch a vendor boot.cfg for one host.
///
/// Returns the complete patched file; its length is the size to advertise.
pub fn patch_boot_cfg(raw: &[u8], ctx: &BootConfigContext) -> Result<Vec<u8>> {
    let stripped = String::from_utf8(raw.iter().copied().filter(|b| *b != b'/').collect())?;
    let mut cfg = BootConfig::parse(&stripped);

    cfg.append_kernelopt(&format!("ks={}", ctx.kickstart_url))?;
    cfg.append_kernelopt(&format!(
        "netdevice={} ip={} netmask={} gateway={}",
        ctx.mac, ctx.ip, ctx.netmask, ctx.gateway
    ))?;
    if let Some(vlan) = ctx.vlan.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        cfg.append_kernelopt(&format!("vlanid={}", vlan))?;
    }
    if ctx.allow_legacy_cpu {
        cfg.append_kernelopt("allowLegacyCPU=true")?;
    }

    if cfg.set("prefix", &ctx.prefix) == 0 {
        debug!("boot.cfg has no prefix line, leaving module paths as-is");
    }

    Ok(cfg.render().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOT_CFG: &str = "bootstate=0\n\
title=Loading ESXi installer\n\
timeout=5\n\
prefix=\n\
kernel=/b.b00\n\
kernelopt=runweasel\n\
modules=/jumpstrt.gz --- /useropts.gz --- /features.gz\n\
build=8.0.2-0.0.22380479\n\
updated=0\n";

    fn ctx() -> BootConfigContext {
        BootConfigContext {
            kickstart_url: "https://10.0.0.2:8443/ks.cfg".to_string(),
            mac: "00:11:22:33:44:55".to_string(),
            ip: "10.0.0.25".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.0.1".to_string(),
            vlan: None,
            allow_legacy_cpu: false,
            prefix: "ESXi-8.0U2".to_string(),
        }
    }

    fn patched(input: &str, ctx: &BootConfigContext) -> String {
        String::from_utf8(patch_boot_cfg(input.as_bytes(), ctx).unwrap()).unwrap()
    }

    #[test]
    fn test_kernelopt_gets_kickstart_then_network() {
        let out = patched(BOOT_CFG, &ctx());
        let cfg = BootConfig::parse(&out);
        assert_eq!(
            cfg.get("kernelopt"),
            Some(
                "runweasel ks=https://10.0.0.2:8443/ks.cfg \
                 netdevice=00:11:22:33:44:55 ip=10.0.0.25 netmask=255.255.255.0 gateway=10.0.0.1"
            )
        );
    }

    #[test]
    fn test_slashes_stripped_and_prefix_set() {
        let out = patched(BOOT_CFG, &ctx());
        let cfg = BootConfig::parse(&out);
        assert_eq!(cfg.get("kernel"), Some("b.b00"));
        assert_eq!(
            cfg.get("modules"),
            Some("jumpstrt.gz --- useropts.gz --- features.gz")
        );
        assert_eq!(cfg.get("prefix"), Some("ESXi-8.0U2"));
        assert_eq!(cfg.get("build"), Some("8.0.2-0.0.22380479"));
    }

    #[test]
    fn test_vlan_and_legacy_cpu() {
        let mut c = ctx();
        c.vlan = Some("100".to_string());
        c.allow_legacy_cpu = true;
        let out = patched(BOOT_CFG, &c);
        let kernelopt = BootConfig::parse(&out).get("kernelopt").unwrap().to_string();
        assert!(kernelopt.ends_with("gateway=10.0.0.1 vlanid=100 allowLegacyCPU=true"));

        c.vlan = Some(String::new());
        let out = patched(BOOT_CFG, &c);
        assert!(!out.contains("vlanid"));
    }

    #[test]
    fn test_unrelated_lines_preserved() {
        let input = "# comment line\r\nkernelopt=cdromBoot\r\nprefix=old\r\nno_newline_at_end=1";
        let out = patched(input, &ctx());
        assert!(out.starts_with("# comment line\r\nkernelopt=cdromBoot ks="));
        assert!(out.contains("gateway=10.0.0.1\r\nprefix=ESXi-8.0U2\r\n"));
        assert!(out.ends_with("no_newline_at_end=1"));
    }

    #[test]
    fn test_prefix_rewrite_is_idempotent() {
        let mut cfg = BootConfig::parse(BOOT_CFG);
        cfg.set("prefix", "ESXi-8.0U2");
        let once = cfg.render();
        cfg.set("prefix", "ESXi-8.0U2");
        assert_eq!(cfg.render(), once);
    }

    #[test]
    fn test_kernelopt_appends_accumulate() {
        let first = patched(BOOT_CFG, &ctx());
        let second = patched(&first, &ctx());
        // Appending is not idempotent; the file must be patched once per transfer
        assert_eq!(second.matches("netdevice=").count(), 2);
    }

    #[test]
    fn test_missing_kernelopt_is_error() {
        let err = patch_boot_cfg(b"prefix=\nkernel=b.b00\n", &ctx()).unwrap_err();
        assert!(matches!(err, BootError::MissingKernelopt));
    }

    #[test]
    fn test_non_utf8_is_rejected() {
        let mut raw = b"title=Loading ESXi\nkernelopt=runweasel\n".to_vec();
        raw.extend_from_slice(b"# build \xe9\xff\n");
        let err = patch_boot_cfg(&raw, &ctx()).unwrap_err();
        assert!(matches!(err, BootError::InvalidEncoding(_)));
    }

    #[test]
    fn test_output_length_matches_content() {
        let out = patch_boot_cfg(BOOT_CFG.as_bytes(), &ctx()).unwrap();
        let expected = BOOT_CFG.replace('/', "").len()
            + " ks=https://10.0.0.2:8443/ks.cfg".len()
            + " netdevice=00:11:22:33:44:55 ip=10.0.0.25 netmask=255.255.255.0 gateway=10.0.0.1".len()
            + "ESXi-8.0U2".len();
        assert_eq!(out.len(), expected);
    }
}
