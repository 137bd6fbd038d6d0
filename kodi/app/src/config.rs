use serde::{Deserialize, Serialize};

use core_rent::RentConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub rent: RentConfig,
}
