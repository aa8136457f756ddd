//! HTTP service command: `pullreq serve`.

use anyhow::Result;

use pullreq::config::ServiceConfig;
use pullreq::review::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: &ServiceConfig, dev: bool) -> Result<()> {
    let mut server_config = ServerConfig::from(config);
    if dev {
        server_config.permissive_cors = true;
    }
    start_server(server_config).await
}
