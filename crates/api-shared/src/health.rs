use crate::dto::HealthRes;

/// Simple health service used by the REST server
///
/// This service provides a standardised way to check the health status of the clinic system.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Creates a new instance of HealthService.
    pub fn new() -> Self {
        Self
    }

    /// Reports the service as alive, with the store's schema check folded in.
    ///
    /// # Arguments
    ///
    /// * `schema_ok` - Whether the store answered at the expected schema version.
    ///
    /// # Returns
    ///
    /// A `HealthRes` whose `ok` flag mirrors `schema_ok`.
    pub fn check_health(schema_ok: bool) -> HealthRes {
        HealthRes {
            ok: schema_ok,
            message: if schema_ok {
                "clinic is alive".into()
            } else {
                "clinic store is unavailable or not migrated".into()
            },
        }
    }
}
