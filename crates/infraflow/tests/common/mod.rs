use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const NETWORK_STACK: &str = r#"
project "algotrading"

resource "rg" kind="Microsoft.Resources/resourceGroups" {
    location "westus"
    resourceGroupName "rg1"
}
resource "vnet" kind="Microsoft.Network/virtualNetworks" parent="rg" {
    location (ref)"rg.location"
    addressSpace {
        addressPrefixes {
            - "10.0.0.0/16"
        }
    }
}
resource "subnet" kind="Microsoft.Network/virtualNetworks/subnets" parent="vnet" {
    addressPrefix "10.10.10.0/24"
    export "subnetID" output="id"
}
resource "cluster" kind="Microsoft.ContainerService/managedClusters" {
    dnsPrefix "dnsprefix1"
    vnetSubnetId (ref)"subnet.id"
    export "clusterName" output="name"
}
resource "vault" kind="Microsoft.KeyVault/vaults" {
    subnetId (ref)"subnet.id"
    export "vaultUri"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// Project with the resource group / network / cluster / vault stack
    #[allow(dead_code)]
    pub fn network_stack() -> Self {
        let project = Self::new();
        project.write_infra_kdl(NETWORK_STACK);
        project
    }

    pub fn write_infra_kdl(&self, content: &str) {
        fs::write(self.root.path().join("infra.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_local_kdl(&self, content: &str) {
        fs::write(self.root.path().join("infra.local.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn state_json(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.root.path().join(".infraflow/state.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}
