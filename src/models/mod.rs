pub mod api;
pub mod canonical;
pub mod scenario;
pub mod turn;
