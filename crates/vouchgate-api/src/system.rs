// System endpoints

use tracing::debug;

use crate::client::RouterOsClient;
use crate::error::Error;
use crate::models::SystemResource;

impl RouterOsClient {
    /// Board, firmware and load figures.
    ///
    /// `GET /rest/system/resource`
    pub async fn system_resource(&self) -> Result<SystemResource, Error> {
        let url = self.rest_url("system/resource")?;
        debug!("fetching system resource");
        self.get(url).await
    }
}
