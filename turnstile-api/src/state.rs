use std::sync::Arc;

use turnstile_booking::{ReservationIntake, SeedService};

use crate::observers::ObserverRegistry;

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<ReservationIntake>,
    pub seeder: Arc<SeedService>,
    pub observers: Arc<ObserverRegistry>,
}
