pub mod intake;
pub mod seeding;
pub mod settlement;

pub use intake::{PublishPolicy, ReservationIntake};
pub use seeding::SeedService;
pub use settlement::SettlementWorker;
