//! User settings, persisted under [`APP_CONFIG_KEY`].

use serde::{Deserialize, Serialize};

use crate::calendar::error::CalendarError;
use crate::prayer::types::{CalculationMethod, Location, MethodSettings, TuneOffsets, CUSTOM_METHOD_ID};
use crate::store::{KeyValueStore, StoreError, APP_CONFIG_KEY};

pub const DEFAULT_PRAYER_METHOD: u32 = 20;

fn default_prayer_method() -> u32 {
    DEFAULT_PRAYER_METHOD
}

/// Parameters used when `prayer_method` is the custom id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomMethod {
    pub settings: MethodSettings,
    #[serde(default)]
    pub tune: TuneOffsets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default = "default_prayer_method")]
    pub prayer_method: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_method: Option<CustomMethod>,
    /// `true` once the user has completed setup.
    #[serde(default)]
    pub first_time_setup: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            location: None,
            prayer_method: DEFAULT_PRAYER_METHOD,
            custom_method: None,
            first_time_setup: false,
        }
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults when nothing is stored or the
    /// stored blob cannot be read.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let Some(blob) = store.get(APP_CONFIG_KEY).await? else {
            return Ok(Self::default());
        };

        match serde_json::from_str::<Self>(&blob) {
            Ok(settings) => {
                if let Some(Err(err)) = settings.location.as_ref().map(Location::validate) {
                    tracing::warn!("Ignoring stored location: {}", err);
                    return Ok(Self {
                        location: None,
                        first_time_setup: false,
                        ..settings
                    });
                }
                Ok(settings)
            }
            Err(err) => {
                tracing::warn!("Unreadable settings, using defaults: {}", err);
                Ok(Self::default())
            }
        }
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        let blob = serde_json::to_string(self)?;
        store.set(APP_CONFIG_KEY, &blob).await
    }

    /// Set the location and mark setup as complete.
    pub fn set_location(&mut self, location: Location) -> Result<(), CalendarError> {
        location.validate()?;
        self.location = Some(location);
        self.first_time_setup = true;
        Ok(())
    }

    pub fn set_method(&mut self, method: &CalculationMethod) {
        self.prayer_method = method.id();
        self.custom_method = match method {
            CalculationMethod::Custom { settings, tune } => Some(CustomMethod {
                settings: *settings,
                tune: *tune,
            }),
            _ => None,
        };
    }

    /// The configured method. Unknown ids, and the custom id without
    /// parameters, fall back to the default.
    pub fn calculation_method(&self) -> CalculationMethod {
        if self.prayer_method == CUSTOM_METHOD_ID {
            if let Some(custom) = self.custom_method {
                return CalculationMethod::Custom {
                    settings: custom.settings,
                    tune: custom.tune,
                };
            }
        }

        CalculationMethod::from_id(self.prayer_method).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown prayer method {}, using {}",
                self.prayer_method,
                DEFAULT_PRAYER_METHOD
            );
            CalculationMethod::default()
        })
    }

    pub fn is_configured(&self) -> bool {
        self.first_time_setup && self.location.is_some()
    }
}
