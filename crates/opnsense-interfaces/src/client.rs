//! Asynchronous client for interface metadata endpoints.

use crate::models::{
    parse_filter_interface_list, parse_groups, parse_interface_export, FilterInterfaceOption,
    InterfaceDescriptor, InterfaceGroup,
};
use crate::source::InterfaceSource;
use crate::Result;
use async_trait::async_trait;
use opnsense_core::query::SearchQuery;
use opnsense_core::ApplianceClient;
use tracing::debug;

/// Interface overview export.
pub const INTERFACE_EXPORT_PATH: &str = "/api/interfaces/overview/export";
/// Interface group listing.
pub const GROUP_SEARCH_PATH: &str = "/api/firewall/group/searchRule";
/// Interface selector of the firewall rule editor.
pub const FILTER_INTERFACE_LIST_PATH: &str = "/api/firewall/filter/get_interface_list";

/// Client for interface and interface-group metadata.
#[derive(Clone)]
pub struct InterfacesClient {
    client: ApplianceClient,
}

impl InterfacesClient {
    /// Wrap an appliance transport.
    #[must_use]
    pub const fn new(client: ApplianceClient) -> Self {
        Self { client }
    }

    /// Access the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &ApplianceClient {
        &self.client
    }

    /// List configured interfaces.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn list_interfaces(&self) -> Result<Vec<InterfaceDescriptor>> {
        let body = self.client.get(INTERFACE_EXPORT_PATH).await?;
        let interfaces = parse_interface_export(body);
        debug!(count = interfaces.len(), "Fetched interface export");
        Ok(interfaces)
    }

    /// List every interface group.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn list_groups(&self) -> Result<Vec<InterfaceGroup>> {
        let body = self
            .client
            .get_with_query(GROUP_SEARCH_PATH, &SearchQuery::all().to_pairs())
            .await?;
        let groups = parse_groups(body);
        debug!(count = groups.len(), "Fetched interface groups");
        Ok(groups)
    }

    /// List the values a filter rule accepts in its `interface` field.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn filter_interface_list(&self) -> Result<Vec<FilterInterfaceOption>> {
        let body = self.client.get(FILTER_INTERFACE_LIST_PATH).await?;
        let options = parse_filter_interface_list(body);
        debug!(count = options.len(), "Fetched filter interface list");
        Ok(options)
    }
}

#[async_trait]
impl InterfaceSource for InterfacesClient {
    async fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>> {
        self.list_interfaces().await
    }

    async fn groups(&self) -> Result<Vec<InterfaceGroup>> {
        self.list_groups().await
    }
}
