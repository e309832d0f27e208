mod bot;

use cddio_tickets::{config, log};

trait ResultLog {
    type OkType;
    fn expect_log(self, msg: &str) -> Self::OkType;
}
impl<T, S: AsRef<str>> ResultLog for Result<T, S> {
    type OkType=T;
    fn expect_log(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) if msg.is_empty() => panic!("{}", e.as_ref()),
            Err(e) => panic!("{}: {}", msg, e.as_ref()),
        }
    }
}

#[tokio::main]
async fn main() {
    log::init().map_err(|e| e.to_string()).expect_log("Impossible d'initialiser le logger");
    let path = std::env::args().nth(1).unwrap_or_else(|| "./config.json".to_string());
    let config = config::Config::load(&path).expect_log("Impossible de charger le fichier de configuration");
    let mut bot = bot::Bot::new(&config).await.expect_log("");
    bot.start().await.expect_log("Le client ne démarre pas");
}
