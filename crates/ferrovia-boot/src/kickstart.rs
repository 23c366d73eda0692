//! Kickstart (ks.cfg) rendering
//!
//! Kickstart templates, including operator supplied overrides, are written
//! in the Go `text/template` dialect (`{{ .ip }}`, `{{ if .ssh }}`,
//! `{{ range .ntp }}`). They are translated to minijinja syntax and rendered
//! against a flat [`KickstartContext`].

use crate::error::{BootError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ferrovia_common::{models::present, netmask_from_prefix, HostRecord};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::borrow::Cow;
use std::net::SocketAddr;
use tracing::debug;

/// Built-in ESXi kickstart
pub const DEFAULT_KICKSTART: &str = r#"
# Accept the VMware End User License Agreement
vmaccepteula

# Set the root password for the DCUI and Tech Support Mode
rootpw {{ .password }}

{{ if .erasedisks }}
# Remove ALL partitions
clearpart --overwritevmfs --alldrives {{ end }}

{{ if .bootdisk }}
install --disk=/vmfs/devices/disks/{{.bootdisk}} --overwritevmfs --novmfsondisk {{ if not .legacycpu }} --forceunsupportedinstall {{ end }}
{{ else }}
# Install on the first local disk available on machine
install --overwritevmfs {{ if not .createvmfs }} --novmfsondisk {{ end }} --firstdisk="localesx,usb,ahci,vmw_ahci,VMware" --forceunsupportedinstall
{{ end }}

# Set the network to static on the first network adapter
network --bootproto=static --ip={{ .ip }} --gateway={{ .gateway }} --netmask={{ .netmask }} {{if .dns}}--nameserver={{ .dns }} {{end}} --hostname={{ .hostname }} --device={{ .mac }} {{if .vlan}} --vlanid={{.vlan}} {{end}}

reboot

%firstboot --interpreter=busybox

# Configure NTP
{{ if .ntp }}
esxcli system ntp set -e true{{ range .ntp }} --server {{ . }}{{ end }}
{{ end }}

# Configure Domain Search
{{ if .domain }}
esxcli network ip dns search add -d {{ .domain }}
{{ end }}

# Configure FQDN
esxcli system hostname set --fqdn {{ .fqdn }}

# Enable SSH
{{ if .ssh }}
vim-cmd hostsvc/enable_ssh
vim-cmd hostsvc/start_ssh
esxcli system settings advanced set -o /UserVars/SuppressShellWarning -i 1
{{ end }}

# Syslog
{{ if .syslog }}
esxcli system syslog config set --loghost={{ .syslog }}
esxcli system syslog reload
esxcli network firewall ruleset set --ruleset-id=syslog --enabled=true
esxcli network firewall refresh
{{ end }}

#vSwitch0
{{ if .vlan }}
esxcli network vswitch standard portgroup set --vlan-id {{.vlan}}
{{ end }}

# Ensure TLS certificate matches ESXi FQDN
/sbin/generate-certificates
/etc/init.d/hostd restart && /etc/init.d/vpxa restart && /etc/init.d/rhttpproxy restart
"#;

/// Values available to kickstart templates
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct KickstartContext {
    /// Decrypted root password
    pub password: String,
    pub ip: String,
    pub mac: String,
    pub gateway: String,
    pub netmask: String,
    pub dns: String,
    pub ntp: Vec<String>,
    pub hostname: String,
    pub domain: String,
    pub fqdn: String,
    pub erasedisks: bool,
    pub ssh: bool,
    pub syslog: String,
    pub bootdisk: String,
    pub vlan: String,
    pub createvmfs: bool,
    pub legacycpu: bool,
    /// Address of this server as seen by the host
    pub server: String,
    /// Same, with the port the host connected to
    pub via_server: String,
}

impl KickstartContext {
    /// Build the context for a host. Fails on malformed group options.
    pub fn from_record(
        record: &HostRecord,
        password: impl Into<String>,
        server: SocketAddr,
    ) -> Result<Self> {
        let options = record.group.parsed_options()?;
        let netmask = netmask_from_prefix(record.pool.netmask)?;
        let optional = |v: &Option<String>| present(v).unwrap_or_default().to_string();

        Ok(Self {
            password: password.into(),
            ip: record.host.ip.clone(),
            mac: record.host.mac.clone(),
            gateway: record.pool.gateway.clone(),
            netmask: netmask.to_string(),
            dns: record.group.dns.clone(),
            ntp: record.group.ntp_servers(),
            hostname: record.host.hostname.clone(),
            domain: record.host.domain.clone(),
            fqdn: record.host.fqdn(),
            erasedisks: options.erase_disks,
            ssh: options.ssh,
            syslog: optional(&record.group.syslog),
            bootdisk: optional(&record.group.boot_disk),
            vlan: optional(&record.group.vlan),
            createvmfs: options.create_vmfs,
            legacycpu: options.allow_legacy_cpu,
            server: server.ip().to_string(),
            via_server: server.to_string(),
        })
    }
}

/// Pick the template for a host: host override, then group override, then
/// the built-in default. Overrides are stored base64 encoded.
pub fn select_template(record: &HostRecord) -> Result<Cow<'static, str>> {
    if let Some(encoded) = present(&record.host.ks) {
        debug!(host_id = record.host.id, "Using host kickstart override");
        return decode_override(encoded).map(Cow::Owned);
    }
    if let Some(encoded) = present(&record.group.ks) {
        debug!(host_id = record.host.id, group_id = record.group.id, "Using group kickstart override");
        return decode_override(encoded).map(Cow::Owned);
    }
    Ok(Cow::Borrowed(DEFAULT_KICKSTART))
}

fn decode_override(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| BootError::InvalidOverride(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| BootError::InvalidOverride(e.to_string()))
}

/// Renders kickstart templates
pub struct KickstartRenderer {
    env: Environment<'static>,
}

impl Default for KickstartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl KickstartRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render a Go-dialect template against `ctx`
    pub fn render(&self, template: &str, ctx: &KickstartContext) -> Result<String> {
        let source = translate(template)?;
        Ok(self.env.render_str(&source, ctx)?)
    }

    /// Select the host's template and render it
    pub fn render_for(&self, record: &HostRecord, ctx: &KickstartContext) -> Result<String> {
        let template = select_template(record)?;
        self.render(&template, ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    Range,
}

/// Translate Go `text/template` actions to minijinja.
///
/// Supported actions: field output, `if`/`else if`/`else`/`end`, `range`
/// with `{{ . }}`, `not`/`and`/`or`/`eq`/`ne`, comments and `-` trim markers.
fn translate(template: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut blocks: Vec<Block> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        push_literal(&mut out, &rest[..open]);
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| BootError::TemplateSyntax("unclosed action".to_string()))?;
        translate_action(&after[..close], &mut blocks, &mut out)?;
        rest = &after[close + 2..];
    }
    push_literal(&mut out, rest);

    if let Some(block) = blocks.last() {
        return Err(BootError::TemplateSyntax(format!(
            "unexpected EOF, missing {{{{ end }}}} for {:?}",
            block
        )));
    }
    Ok(out)
}

/// Literal text, shielded from minijinja's own block and comment syntax
fn push_literal(out: &mut String, text: &str) {
    if text.contains("{%") || text.contains("{#") {
        out.push_str("{% raw %}");
        out.push_str(text);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(text);
    }
}

fn translate_action(raw: &str, blocks: &mut Vec<Block>, out: &mut String) -> Result<()> {
    let (trim_left, body) = match raw.strip_prefix("- ") {
        Some(body) => ("-", body),
        None => ("", raw),
    };
    let (body, trim_right) = match body.strip_suffix(" -") {
        Some(body) => (body, "-"),
        None => (body, ""),
    };
    let body = body.trim();

    if body.starts_with("/*") && body.ends_with("*/") {
        // Comments only matter for their trim markers
        if !trim_left.is_empty() || !trim_right.is_empty() {
            out.push_str(&format!("{{{{{} \"\" {}}}}}", trim_left, trim_right));
        }
        return Ok(());
    }

    let tokens = tokenize(body)?;
    let depth = blocks.iter().filter(|b| **b == Block::Range).count();
    let tag = |out: &mut String, inner: &str| {
        out.push_str(&format!("{{%{} {} {}%}}", trim_left, inner, trim_right));
    };

    match tokens.first().map(String::as_str) {
        None => return Err(BootError::TemplateSyntax("empty action".to_string())),
        Some("end") => match blocks.pop() {
            Some(Block::If) => tag(out, "endif"),
            Some(Block::Range) => tag(out, "endfor"),
            None => return Err(BootError::TemplateSyntax("unexpected {{ end }}".to_string())),
        },
        Some("else") => {
            if blocks.is_empty() {
                return Err(BootError::TemplateSyntax("unexpected {{ else }}".to_string()));
            }
            if tokens.get(1).map(String::as_str) == Some("if") {
                let cond = expression(&tokens[2..], depth)?;
                tag(out, &format!("elif {}", cond));
            } else {
                tag(out, "else");
            }
        }
        Some("if") => {
            let cond = expression(&tokens[1..], depth)?;
            blocks.push(Block::If);
            tag(out, &format!("if {}", cond));
        }
        Some("range") => {
            let list = expression(&tokens[1..], depth)?;
            blocks.push(Block::Range);
            tag(out, &format!("for {} in {}", loop_var(depth + 1), list));
        }
        Some(_) => {
            let value = expression(&tokens, depth)?;
            out.push_str(&format!("{{{{{} {} {}}}}}", trim_left, value, trim_right));
        }
    }
    Ok(())
}

fn loop_var(depth: usize) -> String {
    format!("__item{}", depth)
}

/// Split an action body on whitespace, keeping quoted strings intact
fn tokenize(body: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            let mut token = String::from('"');
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                token.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        token.push(escaped);
                    }
                } else if c == '"' {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(BootError::TemplateSyntax("unterminated string".to_string()));
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

/// Translate a Go template expression (prefix function calls) to an infix
/// minijinja expression
fn expression(tokens: &[String], depth: usize) -> Result<String> {
    let mut pos = 0;
    let expr = operand(tokens, &mut pos, depth)?;
    if pos != tokens.len() {
        return Err(BootError::TemplateSyntax(format!(
            "unsupported expression: {}",
            tokens.join(" ")
        )));
    }
    Ok(expr)
}

fn operand(tokens: &[String], pos: &mut usize, depth: usize) -> Result<String> {
    let token = tokens
        .get(*pos)
        .ok_or_else(|| BootError::TemplateSyntax("missing operand".to_string()))?;
    *pos += 1;

    let binary = |op: &str, pos: &mut usize| -> Result<String> {
        let left = operand(tokens, pos, depth)?;
        let right = operand(tokens, pos, depth)?;
        Ok(format!("({} {} {})", left, op, right))
    };

    match token.as_str() {
        "not" => Ok(format!("(not {})", operand(tokens, pos, depth)?)),
        "and" => binary("and", pos),
        "or" => binary("or", pos),
        "eq" => binary("==", pos),
        "ne" => binary("!=", pos),
        "true" | "false" => Ok(token.clone()),
        "." if depth > 0 => Ok(loop_var(depth)),
        "." => Err(BootError::TemplateSyntax(
            "{{ . }} is only supported inside range".to_string(),
        )),
        t if t.starts_with('"') => Ok(t.to_string()),
        t if t.parse::<i64>().is_ok() => Ok(t.to_string()),
        t => {
            if let Some(field) = t.strip_prefix("$.") {
                return field_path(field);
            }
            match t.strip_prefix('.') {
                Some(field) if depth > 0 => Ok(format!("{}.{}", loop_var(depth), field_path(field)?)),
                Some(field) => field_path(field),
                None => Err(BootError::TemplateSyntax(format!("unsupported token: {}", t))),
            }
        }
    }
}

fn field_path(path: &str) -> Result<String> {
    let valid = !path.is_empty()
        && path.split('.').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !part.starts_with(|c: char| c.is_ascii_digit())
        });
    if valid {
        Ok(path.to_string())
    } else {
        Err(BootError::TemplateSyntax(format!("invalid field: .{}", path)))
    }
}
