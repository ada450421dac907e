use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Path to the `.sqlite` file used to store orchestration state
    #[clap(long, default_value = "./nimbus.sqlite")]
    pub state: String,

    /// Directory management certificates are materialized into
    #[clap(long, default_value = "./certificates")]
    pub certificates_dir: String,

    /// Address to bind the HTTP API to
    #[clap(long, default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Default management endpoint host, recorded against new credentials
    #[clap(long, default_value = "management.core.windows.net")]
    pub management_host: String,
}
