use crate::config::CloudSettings;
use crate::error::{self, Result};

use serde::Serialize;
use snafu::ResultExt;

const VM_TYPE: &str = "standard";
const LOAD_BALANCER_SKU: &str = "standard";
const MAXIMUM_LOAD_BALANCER_RULE_COUNT: u32 = 250;

/// The Azure cloud provider configuration (`azure.json`) read by the kubelet and the
/// control-plane components. Fields serialize in declaration order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudProviderConfig<'a> {
    cloud: &'a str,
    tenant_id: &'a str,
    subscription_id: &'a str,
    aad_client_id: &'a str,
    aad_client_secret: &'a str,
    resource_group: &'a str,
    security_group_name: String,
    location: &'a str,
    vm_type: &'static str,
    vnet_name: String,
    vnet_resource_group: &'a str,
    subnet_name: String,
    route_table_name: String,
    load_balancer_sku: &'static str,
    maximum_load_balancer_rule_count: u32,
    use_managed_identity_extension: bool,
    use_instance_metadata: bool,
}

/// Renders the cloud provider config for the cluster `name`. The cluster's resource group and
/// network resources are all named after it.
pub fn cloud_provider_config(name: &str, location: &str, cloud: &CloudSettings) -> Result<String> {
    let config = CloudProviderConfig {
        cloud: &cloud.environment,
        tenant_id: &cloud.tenant_id,
        subscription_id: &cloud.subscription_id,
        aad_client_id: &cloud.client_id,
        aad_client_secret: &cloud.client_secret,
        resource_group: name,
        security_group_name: format!("{}-node-nsg", name),
        location,
        vm_type: VM_TYPE,
        vnet_name: vnet_name(name),
        vnet_resource_group: name,
        subnet_name: format!("{}-node-subnet", name),
        route_table_name: format!("{}-node-routetable", name),
        load_balancer_sku: LOAD_BALANCER_SKU,
        maximum_load_balancer_rule_count: MAXIMUM_LOAD_BALANCER_RULE_COUNT,
        use_managed_identity_extension: false,
        use_instance_metadata: true,
    };
    serde_json::to_string(&config).context(error::CloudConfigSnafu)
}

pub(crate) fn vnet_name(name: &str) -> String {
    format!("{}-vnet", name)
}
