use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(name = "automqtt", about = "Routes MQTT messages through a virtual topic filesystem")]
pub struct Options {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    pub cfg_name: Option<String>,

    /// Broker address, "tcp://host:port" or "tls://host:port"
    #[structopt(name = "server", long)]
    pub server: Option<String>,

    /// MQTT client id
    #[structopt(name = "client-id", long)]
    pub client_id: Option<String>,

    /// MQTT username
    #[structopt(name = "username", long)]
    pub username: Option<String>,
}
