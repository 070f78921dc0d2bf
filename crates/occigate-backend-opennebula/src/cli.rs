//! OpenNebula CLI wrapper
//!
//! Wraps `onevm`, `onevnet`, `oneimage` and `onetemplate`. Listing and
//! show commands are run with `--json`.

use crate::error::{OpenNebulaError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::Stdio;
use tokio::process::Command;

/// Connection settings passed to every command
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub endpoint: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// OpenNebula CLI wrapper
pub struct OneCli {
    credentials: Credentials,
}

impl OneCli {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Run a CLI command and return stdout
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(endpoint) = &self.credentials.endpoint {
            cmd.arg("--endpoint").arg(endpoint);
        }
        if let Some(user) = &self.credentials.user {
            cmd.arg("--user").arg(user);
        }
        if let Some(password) = &self.credentials.password {
            cmd.arg("--password").arg(password);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A dropped call (timeout, cancelled request) must not leave the command running
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} {}", program, args.join(" "));

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpenNebulaError::CliNotFound(program.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OpenNebulaError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                stderr: stderr.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_json<T: DeserializeOwned>(&self, program: &str, args: &[&str]) -> Result<T> {
        let mut args = args.to_vec();
        args.push("--json");
        let output = self.run_command(program, &args).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Run a `create`-style command on a temporary template file
    async fn run_with_template(&self, program: &str, args: &[&str], template: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("occigate-")
            .suffix(".one")
            .tempfile()?;
        file.write_all(template.as_bytes())?;
        file.flush()?;

        let path = file.path().to_string_lossy().to_string();
        let mut full = args.to_vec();
        full.push(path.as_str());
        self.run_command(program, &full).await
    }

    // Virtual machines

    pub async fn list_vms(&self) -> Result<Vec<VmInfo>> {
        let pool: VmPool = self.run_json("onevm", &["list"]).await?;
        Ok(pool.vm_pool.vm.into_vec())
    }

    pub async fn show_vm(&self, id: &str) -> Result<VmInfo> {
        let vm: VmDocument = self.run_json("onevm", &["show", id]).await?;
        Ok(vm.vm)
    }

    /// Instantiate a VM template; returns the new VM id
    pub async fn instantiate(&self, template_id: &str, config: &InstantiateConfig) -> Result<String> {
        let cpu = config.cpu.map(|c| c.to_string());
        let memory = config.memory_mb.map(|m| m.to_string());

        let mut args = vec!["instantiate", template_id];
        if let Some(ref name) = config.name {
            args.push("--name");
            args.push(name.as_str());
        }
        if let Some(ref cpu) = cpu {
            args.push("--vcpu");
            args.push(cpu.as_str());
        }
        if let Some(ref memory) = memory {
            args.push("--memory");
            args.push(memory.as_str());
        }

        let output = self.run_command("onetemplate", &args).await?;
        parse_created_id(&output)
    }

    /// `onevm <action> <id> [flags]`
    pub async fn vm_action(&self, action: &str, id: &str, flags: &[&str]) -> Result<()> {
        let mut args = vec![action, id];
        args.extend_from_slice(flags);
        self.run_command("onevm", &args).await?;
        Ok(())
    }

    pub async fn rename_vm(&self, id: &str, name: &str) -> Result<()> {
        self.run_command("onevm", &["rename", id, name]).await?;
        Ok(())
    }

    pub async fn nic_attach(&self, vm_id: &str, network_id: &str) -> Result<()> {
        self.run_command("onevm", &["nic-attach", vm_id, "--network", network_id])
            .await?;
        Ok(())
    }

    pub async fn nic_detach(&self, vm_id: &str, nic_id: &str) -> Result<()> {
        self.run_command("onevm", &["nic-detach", vm_id, nic_id]).await?;
        Ok(())
    }

    pub async fn disk_attach(&self, vm_id: &str, image_id: &str) -> Result<()> {
        self.run_command("onevm", &["disk-attach", vm_id, "--image", image_id])
            .await?;
        Ok(())
    }

    pub async fn disk_detach(&self, vm_id: &str, disk_id: &str) -> Result<()> {
        self.run_command("onevm", &["disk-detach", vm_id, disk_id]).await?;
        Ok(())
    }

    // Virtual networks

    pub async fn list_vnets(&self) -> Result<Vec<VnetInfo>> {
        let pool: VnetPool = self.run_json("onevnet", &["list"]).await?;
        Ok(pool.vnet_pool.vnet.into_vec())
    }

    pub async fn show_vnet(&self, id: &str) -> Result<VnetInfo> {
        let vnet: VnetDocument = self.run_json("onevnet", &["show", id]).await?;
        Ok(vnet.vnet)
    }

    pub async fn create_vnet(&self, template: &str) -> Result<String> {
        let output = self.run_with_template("onevnet", &["create"], template).await?;
        parse_created_id(&output)
    }

    pub async fn delete_vnet(&self, id: &str) -> Result<()> {
        self.run_command("onevnet", &["delete", id]).await?;
        Ok(())
    }

    pub async fn rename_vnet(&self, id: &str, name: &str) -> Result<()> {
        self.run_command("onevnet", &["rename", id, name]).await?;
        Ok(())
    }

    // Images

    pub async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let pool: ImagePool = self.run_json("oneimage", &["list"]).await?;
        Ok(pool.image_pool.image.into_vec())
    }

    pub async fn show_image(&self, id: &str) -> Result<ImageInfo> {
        let image: ImageDocument = self.run_json("oneimage", &["show", id]).await?;
        Ok(image.image)
    }

    pub async fn create_image(&self, datastore: &str, template: &str) -> Result<String> {
        let output = self
            .run_with_template("oneimage", &["create", "--datastore", datastore], template)
            .await?;
        parse_created_id(&output)
    }

    /// `oneimage <action> <id>`
    pub async fn image_action(&self, action: &str, id: &str) -> Result<()> {
        self.run_command("oneimage", &[action, id]).await?;
        Ok(())
    }

    pub async fn rename_image(&self, id: &str, name: &str) -> Result<()> {
        self.run_command("oneimage", &["rename", id, name]).await?;
        Ok(())
    }

    // VM templates

    pub async fn list_templates(&self) -> Result<Vec<TemplateInfo>> {
        let pool: TemplatePool = self.run_json("onetemplate", &["list"]).await?;
        Ok(pool.vmtemplate_pool.vmtemplate.into_vec())
    }
}

/// Extract the id from `ID: 42` / `VM ID: 42` output
pub fn parse_created_id(output: &str) -> Result<String> {
    output
        .lines()
        .find_map(|line| {
            let (_, id) = line.rsplit_once("ID:")?;
            let id = id.trim();
            (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
        })
        .ok_or_else(|| OpenNebulaError::UnexpectedOutput(output.trim().to_string()))
}

/// Options for `onetemplate instantiate`
#[derive(Debug, Clone, Default)]
pub struct InstantiateConfig {
    pub name: Option<String>,
    pub cpu: Option<i64>,
    pub memory_mb: Option<i64>,
}

/// A single element or a list; the CLI collapses one-element lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::Many(items) => items.iter(),
            Self::One(item) => std::slice::from_ref(item).iter(),
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct VmPool {
    #[serde(rename = "VM_POOL")]
    vm_pool: VmPoolBody,
}

#[derive(Debug, Deserialize)]
struct VmPoolBody {
    #[serde(rename = "VM", default)]
    vm: OneOrMany<VmInfo>,
}

#[derive(Debug, Deserialize)]
struct VmDocument {
    #[serde(rename = "VM")]
    vm: VmInfo,
}

/// Virtual machine information from `onevm`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "NAME")]
    pub name: String,

    #[serde(rename = "STATE")]
    pub state: String,

    #[serde(rename = "LCM_STATE", default)]
    pub lcm_state: Option<String>,

    #[serde(rename = "TEMPLATE", default)]
    pub template: VmTemplate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmTemplate {
    #[serde(rename = "CPU", default)]
    pub cpu: Option<String>,

    #[serde(rename = "VCPU", default)]
    pub vcpu: Option<String>,

    #[serde(rename = "MEMORY", default)]
    pub memory: Option<String>,

    #[serde(rename = "TEMPLATE_ID", default)]
    pub template_id: Option<String>,

    #[serde(rename = "NIC", default)]
    pub nics: OneOrMany<NicInfo>,

    #[serde(rename = "DISK", default)]
    pub disks: OneOrMany<DiskInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicInfo {
    #[serde(rename = "NIC_ID")]
    pub nic_id: String,

    #[serde(rename = "NETWORK_ID", default)]
    pub network_id: Option<String>,

    #[serde(rename = "MAC", default)]
    pub mac: Option<String>,

    #[serde(rename = "IP", default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskInfo {
    #[serde(rename = "DISK_ID")]
    pub disk_id: String,

    #[serde(rename = "IMAGE_ID", default)]
    pub image_id: Option<String>,

    #[serde(rename = "TARGET", default)]
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VnetPool {
    #[serde(rename = "VNET_POOL")]
    vnet_pool: VnetPoolBody,
}

#[derive(Debug, Deserialize)]
struct VnetPoolBody {
    #[serde(rename = "VNET", default)]
    vnet: OneOrMany<VnetInfo>,
}

#[derive(Debug, Deserialize)]
struct VnetDocument {
    #[serde(rename = "VNET")]
    vnet: VnetInfo,
}

/// Virtual network information from `onevnet`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VnetInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "NAME")]
    pub name: String,

    #[serde(rename = "VLAN_ID", default)]
    pub vlan_id: Option<String>,

    #[serde(rename = "TEMPLATE", default)]
    pub template: VnetTemplate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VnetTemplate {
    #[serde(rename = "NETWORK_ADDRESS", default)]
    pub network_address: Option<String>,

    #[serde(rename = "GATEWAY", default)]
    pub gateway: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagePool {
    #[serde(rename = "IMAGE_POOL")]
    image_pool: ImagePoolBody,
}

#[derive(Debug, Deserialize)]
struct ImagePoolBody {
    #[serde(rename = "IMAGE", default)]
    image: OneOrMany<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageDocument {
    #[serde(rename = "IMAGE")]
    image: ImageInfo,
}

/// Image information from `oneimage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "NAME")]
    pub name: String,

    #[serde(rename = "STATE")]
    pub state: String,

    /// Size in MB
    #[serde(rename = "SIZE", default)]
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemplatePool {
    #[serde(rename = "VMTEMPLATE_POOL")]
    vmtemplate_pool: TemplatePoolBody,
}

#[derive(Debug, Deserialize)]
struct TemplatePoolBody {
    #[serde(rename = "VMTEMPLATE", default)]
    vmtemplate: OneOrMany<TemplateInfo>,
}

/// VM template information from `onetemplate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "NAME")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_pool() {
        let json = r#"{"VM_POOL":{"VM":[
            {"ID":"12","NAME":"web","STATE":"3","LCM_STATE":"3",
             "TEMPLATE":{"VCPU":"2","MEMORY":"2048",
                "NIC":{"NIC_ID":"0","NETWORK_ID":"4","MAC":"02:00:0a:00:00:01","IP":"10.0.0.1"},
                "DISK":[{"DISK_ID":"0","IMAGE_ID":"7","TARGET":"vda"},{"DISK_ID":"1","IMAGE_ID":"9","TARGET":"vdb"}]}},
            {"ID":"13","NAME":"db","STATE":"5"}
        ]}}"#;
        let pool: VmPool = serde_json::from_str(json).unwrap();
        let vms = pool.vm_pool.vm.into_vec();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].template.nics.iter().count(), 1);
        assert_eq!(vms[0].template.disks.iter().count(), 2);
        assert_eq!(vms[1].template.vcpu, None);
    }

    #[test]
    fn test_parse_single_and_empty_pools() {
        let single = r#"{"VNET_POOL":{"VNET":{"ID":"4","NAME":"private","VLAN_ID":"100"}}}"#;
        let pool: VnetPool = serde_json::from_str(single).unwrap();
        let vnets = pool.vnet_pool.vnet.into_vec();
        assert_eq!(vnets.len(), 1);
        assert_eq!(vnets[0].vlan_id.as_deref(), Some("100"));

        let empty = r#"{"IMAGE_POOL":{}}"#;
        let pool: ImagePool = serde_json::from_str(empty).unwrap();
        assert!(pool.image_pool.image.into_vec().is_empty());
    }

    #[test]
    fn test_parse_template_pool() {
        let json = r#"{"VMTEMPLATE_POOL":{"VMTEMPLATE":[{"ID":"0","NAME":"Ubuntu 22.04"},{"ID":"3","NAME":"Alpine"}]}}"#;
        let pool: TemplatePool = serde_json::from_str(json).unwrap();
        let names: Vec<_> = pool
            .vmtemplate_pool
            .vmtemplate
            .into_vec()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Ubuntu 22.04", "Alpine"]);
    }

    #[test]
    fn test_parse_created_id() {
        assert_eq!(parse_created_id("VM ID: 42\n").unwrap(), "42");
        assert_eq!(parse_created_id("ID: 7").unwrap(), "7");
        assert!(parse_created_id("done").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_command_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 1; touch {}", marker.display());
        let cli = OneCli::new(Credentials::default());

        let args = ["-c", script.as_str()];
        let run = cli.run_command("sh", &args);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(100), run).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
