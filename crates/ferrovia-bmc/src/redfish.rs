//! Redfish protocol implementation
//!
//! Talks to the DMTF Redfish REST API. Every operation logs in with a
//! session (`POST /redfish/v1/SessionService/Sessions`), authenticates the
//! following requests with the returned `X-Auth-Token` and deletes the
//! session before returning.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::controller::BmcController;
use crate::error::{BmcError, Result};
use crate::types::{BmcFlavour, IfaceConfig, PowerState, RedfishConfig, ResetType};

const SERVICE_ROOT: &str = "/redfish/v1";
const SESSIONS: &str = "/redfish/v1/SessionService/Sessions";

/// Redfish REST API controller
#[derive(Debug)]
pub struct RedfishController {
    config: RedfishConfig,
    client: Client,
}

impl RedfishController {
    /// Create a new Redfish controller
    pub fn new(config: RedfishConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| BmcError::InvalidConfig(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn login(&self) -> Result<Session> {
        let url = format!("{}{}", self.config.endpoint, SESSIONS);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "UserName": self.config.username,
                "Password": self.config.password,
            }))
            .send()
            .await
            .map_err(|e| BmcError::transport(&url, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BmcError::AuthenticationFailed(format!(
                "{} rejected credentials for {}",
                self.config.endpoint, self.config.username
            )));
        }
        if !status.is_success() {
            return Err(BmcError::ConnectionFailed(format!(
                "session creation on {} returned {}",
                self.config.endpoint, status
            )));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let token = header("X-Auth-Token").ok_or_else(|| BmcError::InvalidResponse {
            url: url.clone(),
            reason: "no X-Auth-Token header".to_string(),
        })?;
        let location = header("Location");

        debug!(endpoint = %self.config.endpoint, "Redfish session opened");
        Ok(Session {
            client: self.client.clone(),
            endpoint: self.config.endpoint.clone(),
            token,
            location,
        })
    }

    async fn interfaces(&self, session: &Session) -> Result<Vec<IfaceConfig>> {
        let root = session.get(SERVICE_ROOT).await?;
        let mut ifaces = Vec::new();

        for chassis in session.members(&link(&root, "Chassis", "/redfish/v1/Chassis")).await? {
            let chassis_doc = session.get(&chassis).await?;
            let adapters_path = link(&chassis_doc, "NetworkAdapters", &format!("{}/NetworkAdapters", chassis));
            let adapters = match session.members(&adapters_path).await {
                Ok(adapters) => adapters,
                Err(e) => {
                    warn!(chassis = %chassis, error = %e, "Error getting network adapters");
                    continue;
                }
            };

            for adapter in adapters {
                let ports = match self.adapter_ports(session, &adapter).await {
                    Ok(ports) => ports,
                    Err(e) => {
                        warn!(adapter = %adapter, error = %e, "Error getting network ports");
                        continue;
                    }
                };
                ifaces.extend(ports);
            }
        }

        for manager in session.members(&link(&root, "Managers", "/redfish/v1/Managers")).await? {
            match self.ethernet_interfaces(session, &manager).await {
                Ok(found) => ifaces.extend(found),
                Err(e) => warn!(manager = %manager, error = %e, "Error getting Ethernet interfaces"),
            }
        }

        for system in self.systems(session).await? {
            match self.ethernet_interfaces(session, &system).await {
                Ok(found) => ifaces.extend(found),
                Err(e) => warn!(system = %system, error = %e, "Error getting Ethernet interfaces"),
            }
        }

        Ok(ifaces)
    }

    async fn adapter_ports(&self, session: &Session, adapter: &str) -> Result<Vec<IfaceConfig>> {
        let doc = session.get(adapter).await?;
        let ports_path = link(&doc, "NetworkPorts", &format!("{}/NetworkPorts", adapter));
        let mut ports = Vec::new();
        for port in session.members(&ports_path).await? {
            let port = session.get(&port).await?;
            let macs: Vec<&str> = port["AssociatedNetworkAddresses"]
                .as_array()
                .map(|addrs| addrs.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            ports.push(IfaceConfig {
                iface_name: text(&port, "Name"),
                // Ports carry no IP configuration
                ip_address: String::new(),
                mac_address: macs.join(","),
                speed: format!("{} Mbps", port["CurrentLinkSpeedMbps"].as_u64().unwrap_or(0)),
                status: text(&port, "LinkStatus"),
            });
        }
        Ok(ports)
    }

    async fn ethernet_interfaces(&self, session: &Session, owner: &str) -> Result<Vec<IfaceConfig>> {
        let doc = session.get(owner).await?;
        let path = link(&doc, "EthernetInterfaces", &format!("{}/EthernetInterfaces", owner));
        let mut ifaces = Vec::new();
        for iface in session.members(&path).await? {
            let iface = session.get(&iface).await?;
            let ip = iface["IPv4Addresses"][0]["Address"]
                .as_str()
                .unwrap_or("UNKNOWN")
                .to_string();
            ifaces.push(IfaceConfig {
                iface_name: text(&iface, "Name"),
                ip_address: ip,
                mac_address: text(&iface, "MACAddress"),
                speed: format!("{} Mbps", iface["SpeedMbps"].as_u64().unwrap_or(0)),
                status: text(&iface, "LinkStatus"),
            });
        }
        Ok(ifaces)
    }

    async fn systems(&self, session: &Session) -> Result<Vec<String>> {
        let root = session.get(SERVICE_ROOT).await?;
        session.members(&link(&root, "Systems", "/redfish/v1/Systems")).await
    }

    async fn apply_vlan_id(&self, session: &Session, vlan_id: u16) -> Result<()> {
        for system in self.systems(session).await? {
            let doc = session.get(&system).await?;
            let bios_path = link(&doc, "Bios", &format!("{}/Bios", system));
            let bios = session.get(&bios_path).await?;

            let mut attributes: Map<String, Value> = bios["Attributes"]
                .as_object()
                .cloned()
                .ok_or_else(|| BmcError::InvalidResponse {
                    url: session.url(&bios_path),
                    reason: "no Attributes object".to_string(),
                })?;
            debug!(
                system = %system,
                vlan_id = %attributes.get("VlanId").unwrap_or(&serde_json::Value::Null),
                vlan_control = %attributes.get("VlanControl").unwrap_or(&serde_json::Value::Null),
                "Current BIOS VLAN attributes"
            );

            attributes.insert("VlanId".to_string(), json!(vlan_id));
            attributes.insert("VlanControl".to_string(), json!("Enabled"));

            // Pending BIOS changes go to the settings object when there is one
            let target = bios["@Redfish.Settings"]["SettingsObject"]["@odata.id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(bios_path);
            session
                .send(Method::PATCH, &target, Some(&json!({ "Attributes": attributes })))
                .await?;
        }
        info!(endpoint = %self.config.endpoint, vlan_id, "BIOS VLAN ID set");
        Ok(())
    }

    async fn apply_one_time_http_boot(&self, session: &Session) -> Result<()> {
        let systems = self.systems(session).await?;

        // Check every system before touching any of them
        for system in &systems {
            let doc = session.get(system).await?;
            let power = PowerState::from_redfish(doc["PowerState"].as_str());
            if !power.is_settled() {
                warn!(system = %system, power = %power, "System is in POST, not changing boot override");
                return Err(BmcError::InvalidState {
                    system: system.clone(),
                    reason: format!("power state is {}", power),
                });
            }
            if doc["Status"]["State"].as_str() == Some("Starting") {
                warn!(system = %system, "System is in POST, not changing boot override");
                return Err(BmcError::InvalidState {
                    system: system.clone(),
                    reason: "status is Starting".to_string(),
                });
            }
        }

        let body = json!({
            "Boot": {
                "BootSourceOverrideTarget": "UefiHttp",
                "BootSourceOverrideEnabled": "Once",
            }
        });
        for system in &systems {
            session.send(Method::PATCH, system, Some(&body)).await?;
            info!(system = %system, "One-time HTTP boot set");
        }
        Ok(())
    }

    /// Reset every system, continuing past failures
    async fn reset_all(&self, session: &Session, reset: ResetType) -> Result<()> {
        let mut failures = Vec::new();

        for system in self.systems(session).await? {
            let result = async {
                let doc = session.get(&system).await?;
                let target = doc["Actions"]["#ComputerSystem.Reset"]["target"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}/Actions/ComputerSystem.Reset", system));
                session
                    .send(Method::POST, &target, Some(&json!({ "ResetType": reset.as_str() })))
                    .await
            }
            .await;

            match result {
                Ok(_) => info!(system = %system, reset = reset.as_str(), "Reset issued"),
                Err(e) => {
                    warn!(system = %system, reset = reset.as_str(), error = %e, "Reset failed");
                    failures.push(format!("{}: {}", system, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BmcError::CommandFailed(format!(
                "{} failed for {}",
                reset.as_str(),
                failures.join("; ")
            )))
        }
    }

    async fn reset(&self, reset: ResetType) -> Result<()> {
        let session = self.login().await?;
        let result = self.reset_all(&session, reset).await;
        session.logout().await;
        result
    }
}

#[async_trait]
impl BmcController for RedfishController {
    async fn get_host_config(&self, only_active: bool) -> Result<Vec<IfaceConfig>> {
        let session = self.login().await?;
        let result = self.interfaces(&session).await;
        session.logout().await;

        let mut ifaces = result?;
        if only_active {
            ifaces.retain(IfaceConfig::is_active);
        }
        Ok(ifaces)
    }

    async fn set_vlan_id(&self, vlan_id: u16) -> Result<()> {
        let session = self.login().await?;
        let result = self.apply_vlan_id(&session, vlan_id).await;
        session.logout().await;
        result
    }

    async fn set_one_time_http_boot(&self) -> Result<()> {
        let session = self.login().await?;
        let result = self.apply_one_time_http_boot(&session).await;
        session.logout().await;
        result
    }

    async fn reboot_server(&self) -> Result<()> {
        self.reset(ResetType::ForceRestart).await
    }

    async fn start_server(&self) -> Result<()> {
        self.reset(ResetType::On).await
    }

    async fn stop_server(&self) -> Result<()> {
        self.reset(ResetType::ForceOff).await
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn flavour(&self) -> BmcFlavour {
        BmcFlavour::Redfish
    }
}

/// An authenticated Redfish session
struct Session {
    client: Client,
    endpoint: String,
    token: String,
    location: Option<String>,
}

impl Session {
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.endpoint, path)
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<reqwest::Response> {
        let url = self.url(path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("X-Auth-Token", &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BmcError::transport(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BmcError::CommandFailed(format!(
                "{} {} returned {}: {}",
                method, url, status, detail
            )));
        }
        Ok(response)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        self.send(Method::GET, path, None)
            .await?
            .json()
            .await
            .map_err(|e| BmcError::InvalidResponse {
                url,
                reason: e.to_string(),
            })
    }

    /// `@odata.id` of every member of a collection
    async fn members(&self, path: &str) -> Result<Vec<String>> {
        let doc = self.get(path).await?;
        Ok(doc["Members"]
            .as_array()
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| m["@odata.id"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Delete the session; failures are only logged
    async fn logout(self) {
        let Some(location) = self.location.as_deref() else {
            debug!(endpoint = %self.endpoint, "No session location to delete");
            return;
        };
        match self.send(Method::DELETE, location, None).await {
            Ok(_) => debug!(endpoint = %self.endpoint, "Redfish session closed"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Failed to close Redfish session"),
        }
    }
}

/// `@odata.id` of a navigation property, or `fallback`
fn link(doc: &Value, property: &str, fallback: &str) -> String {
    doc[property]["@odata.id"]
        .as_str()
        .unwrap_or(fallback)
        .to_string()
}

fn text(doc: &Value, property: &str) -> String {
    doc[property].as_str().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    /// In-process Redfish BMC with one system
    struct MockBmc {
        power_state: &'static str,
        status_state: &'static str,
        fail_reset: bool,
        requests: Mutex<Vec<(String, String, Option<Value>)>>,
    }

    impl MockBmc {
        fn new(power_state: &'static str, status_state: &'static str) -> Self {
            Self {
                power_state,
                status_state,
                fail_reset: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String, Option<Value>)> {
            self.requests.lock().unwrap().clone()
        }

        fn count(&self, method: &str) -> usize {
            self.calls().iter().filter(|(m, _, _)| m == method).count()
        }
    }

    fn members(ids: &[&str]) -> Value {
        json!({ "Members": ids.iter().map(|id| json!({ "@odata.id": id })).collect::<Vec<_>>() })
    }

    async fn handle(
        State(mock): State<Arc<MockBmc>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let path = uri.path().to_string();
        let body: Option<Value> = serde_json::from_slice(&body).ok();
        mock.requests
            .lock()
            .unwrap()
            .push((method.to_string(), path.clone(), body.clone()));

        if method == Method::POST && path == SESSIONS {
            let ok = body
                .as_ref()
                .map(|b| b["UserName"] == "admin" && b["Password"] == "secret")
                .unwrap_or(false);
            if !ok {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            return (
                StatusCode::CREATED,
                [
                    ("X-Auth-Token", "token-1"),
                    ("Location", "/redfish/v1/SessionService/Sessions/1"),
                ],
                Json(json!({ "Id": "1" })),
            )
                .into_response();
        }

        if headers.get("X-Auth-Token").and_then(|v| v.to_str().ok()) != Some("token-1") {
            return StatusCode::UNAUTHORIZED.into_response();
        }

        let doc = match (method.as_str(), path.as_str()) {
            ("DELETE", "/redfish/v1/SessionService/Sessions/1") => {
                return StatusCode::NO_CONTENT.into_response()
            }
            ("GET", "/redfish/v1") => json!({
                "Systems": { "@odata.id": "/redfish/v1/Systems" },
                "Chassis": { "@odata.id": "/redfish/v1/Chassis" },
                "Managers": { "@odata.id": "/redfish/v1/Managers" },
            }),
            ("GET", "/redfish/v1/Systems") => members(&["/redfish/v1/Systems/1"]),
            ("GET", "/redfish/v1/Systems/1") => json!({
                "Id": "1",
                "PowerState": mock.power_state,
                "Status": { "State": mock.status_state },
                "Bios": { "@odata.id": "/redfish/v1/Systems/1/Bios" },
                "EthernetInterfaces": { "@odata.id": "/redfish/v1/Systems/1/EthernetInterfaces" },
                "Actions": {
                    "#ComputerSystem.Reset": {
                        "target": "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset"
                    }
                },
            }),
            ("PATCH", "/redfish/v1/Systems/1") => json!({}),
            ("POST", "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset") => {
                if mock.fail_reset {
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
                return StatusCode::NO_CONTENT.into_response();
            }
            ("GET", "/redfish/v1/Systems/1/Bios") => json!({
                "Attributes": { "BootMode": "Uefi", "VlanId": 0, "VlanControl": "Disabled" },
                "@Redfish.Settings": {
                    "SettingsObject": { "@odata.id": "/redfish/v1/Systems/1/Bios/Settings" }
                },
            }),
            ("PATCH", "/redfish/v1/Systems/1/Bios/Settings") => json!({}),
            ("GET", "/redfish/v1/Systems/1/EthernetInterfaces") => {
                members(&["/redfish/v1/Systems/1/EthernetInterfaces/1"])
            }
            ("GET", "/redfish/v1/Systems/1/EthernetInterfaces/1") => json!({
                "Name": "NIC.Integrated.1",
                "MACAddress": "00:11:22:33:44:55",
                "SpeedMbps": 10000,
                "LinkStatus": "LinkDown",
                "IPv4Addresses": [],
            }),
            ("GET", "/redfish/v1/Chassis") => members(&["/redfish/v1/Chassis/1"]),
            ("GET", "/redfish/v1/Chassis/1") => json!({
                "NetworkAdapters": { "@odata.id": "/redfish/v1/Chassis/1/NetworkAdapters" },
            }),
            ("GET", "/redfish/v1/Chassis/1/NetworkAdapters") => {
                members(&["/redfish/v1/Chassis/1/NetworkAdapters/A"])
            }
            ("GET", "/redfish/v1/Chassis/1/NetworkAdapters/A") => json!({
                "NetworkPorts": { "@odata.id": "/redfish/v1/Chassis/1/NetworkAdapters/A/NetworkPorts" },
            }),
            ("GET", "/redfish/v1/Chassis/1/NetworkAdapters/A/NetworkPorts") => {
                members(&["/redfish/v1/Chassis/1/NetworkAdapters/A/NetworkPorts/1"])
            }
            ("GET", "/redfish/v1/Chassis/1/NetworkAdapters/A/NetworkPorts/1") => json!({
                "Name": "Port 1",
                "AssociatedNetworkAddresses": ["00:11:22:33:44:55"],
                "CurrentLinkSpeedMbps": 25000,
                "LinkStatus": "Up",
            }),
            ("GET", "/redfish/v1/Managers") => members(&["/redfish/v1/Managers/1"]),
            ("GET", "/redfish/v1/Managers/1") => json!({
                "EthernetInterfaces": { "@odata.id": "/redfish/v1/Managers/1/EthernetInterfaces" },
            }),
            ("GET", "/redfish/v1/Managers/1/EthernetInterfaces") => {
                members(&["/redfish/v1/Managers/1/EthernetInterfaces/1"])
            }
            ("GET", "/redfish/v1/Managers/1/EthernetInterfaces/1") => json!({
                "Name": "Manager Ethernet Interface",
                "MACAddress": "aa:bb:cc:dd:ee:ff",
                "SpeedMbps": 1000,
                "LinkStatus": "LinkUp",
                "IPv4Addresses": [{ "Address": "10.0.0.200" }],
            }),
            _ => return StatusCode::NOT_FOUND.into_response(),
        };
        Json(doc).into_response()
    }

    async fn start(mock: MockBmc) -> (Arc<MockBmc>, RedfishController) {
        let mock = Arc::new(mock);
        let app = Router::new().fallback(handle).with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = RedfishConfig::with_endpoint(format!("http://{}", addr), "admin", "secret");
        (mock, RedfishController::new(config).unwrap())
    }

    fn session_closed(mock: &MockBmc) -> bool {
        mock.calls()
            .iter()
            .any(|(m, p, _)| m == "DELETE" && p == "/redfish/v1/SessionService/Sessions/1")
    }

    #[tokio::test]
    async fn test_set_vlan_id_resubmits_all_attributes() {
        let (mock, controller) = start(MockBmc::new("On", "Enabled")).await;

        controller.set_vlan_id(100).await.unwrap();

        let calls = mock.calls();
        let (_, _, body) = calls
            .iter()
            .find(|(m, p, _)| m == "PATCH" && p == "/redfish/v1/Systems/1/Bios/Settings")
            .expect("BIOS settings PATCH");
        let attributes = &body.as_ref().unwrap()["Attributes"];
        assert_eq!(attributes["VlanId"], 100);
        assert_eq!(attributes["VlanControl"], "Enabled");
        assert_eq!(attributes["BootMode"], "Uefi");
        assert!(session_closed(&mock));
    }

    #[tokio::test]
    async fn test_one_time_http_boot() {
        let (mock, controller) = start(MockBmc::new("Off", "Enabled")).await;

        controller.set_one_time_http_boot().await.unwrap();

        let calls = mock.calls();
        let (_, _, body) = calls
            .iter()
            .find(|(m, p, _)| m == "PATCH" && p == "/redfish/v1/Systems/1")
            .expect("system PATCH");
        let boot = &body.as_ref().unwrap()["Boot"];
        assert_eq!(boot["BootSourceOverrideTarget"], "UefiHttp");
        assert_eq!(boot["BootSourceOverrideEnabled"], "Once");
        assert!(session_closed(&mock));
    }

    #[tokio::test]
    async fn test_one_time_http_boot_rejected_while_starting() {
        let (mock, controller) = start(MockBmc::new("On", "Starting")).await;

        let err = controller.set_one_time_http_boot().await.unwrap_err();

        assert!(matches!(err, BmcError::InvalidState { .. }));
        assert_eq!(mock.count("PATCH"), 0);
        assert!(session_closed(&mock));
    }

    #[tokio::test]
    async fn test_one_time_http_boot_rejected_while_powering_on() {
        let (mock, controller) = start(MockBmc::new("PoweringOn", "Enabled")).await;

        let err = controller.set_one_time_http_boot().await.unwrap_err();

        assert!(err.to_string().contains("powering on"));
        assert_eq!(mock.count("PATCH"), 0);
    }

    #[tokio::test]
    async fn test_power_actions_use_reset_types() {
        let (mock, controller) = start(MockBmc::new("On", "Enabled")).await;

        controller.reboot_server().await.unwrap();
        controller.start_server().await.unwrap();
        controller.stop_server().await.unwrap();

        let resets: Vec<Value> = mock
            .calls()
            .into_iter()
            .filter(|(m, p, _)| m == "POST" && p.ends_with("ComputerSystem.Reset"))
            .filter_map(|(_, _, body)| body)
            .map(|body| body["ResetType"].clone())
            .collect();
        assert_eq!(resets, vec![json!("ForceRestart"), json!("On"), json!("ForceOff")]);
        assert_eq!(mock.count("DELETE"), 3);
    }

    #[tokio::test]
    async fn test_reset_failure_still_closes_session() {
        let mut bmc = MockBmc::new("On", "Enabled");
        bmc.fail_reset = true;
        let (mock, controller) = start(bmc).await;

        let err = controller.reboot_server().await.unwrap_err();

        assert!(matches!(err, BmcError::CommandFailed(_)));
        assert!(session_closed(&mock));
    }

    #[tokio::test]
    async fn test_get_host_config() {
        let (mock, controller) = start(MockBmc::new("On", "Enabled")).await;

        let all = controller.get_host_config(false).await.unwrap();
        assert_eq!(all.len(), 3);

        let port = &all[0];
        assert_eq!(port.iface_name, "Port 1");
        assert_eq!(port.mac_address, "00:11:22:33:44:55");
        assert_eq!(port.speed, "25000 Mbps");

        let manager = &all[1];
        assert_eq!(manager.ip_address, "10.0.0.200");

        let nic = &all[2];
        assert_eq!(nic.ip_address, "UNKNOWN");
        assert_eq!(nic.status, "LinkDown");

        let active = controller.get_host_config(true).await.unwrap();
        let names: Vec<&str> = active.iter().map(|i| i.iface_name.as_str()).collect();
        assert_eq!(names, vec!["Port 1", "Manager Ethernet Interface"]);
        assert_eq!(mock.count("DELETE"), 2);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let (mock, controller) = start(MockBmc::new("On", "Enabled")).await;
        let config = RedfishConfig::with_endpoint(controller.endpoint(), "admin", "wrong");
        let controller = RedfishController::new(config).unwrap();

        let err = controller.reboot_server().await.unwrap_err();
        assert!(matches!(err, BmcError::AuthenticationFailed(_)));
        assert_eq!(mock.count("POST"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_bmc() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = RedfishConfig::with_endpoint(format!("http://{}", addr), "admin", "secret");
        let controller = RedfishController::new(config).unwrap();

        let err = controller.set_vlan_id(10).await.unwrap_err();
        assert!(matches!(
            err,
            BmcError::ConnectionFailed(_) | BmcError::Http { .. }
        ));
    }
}
