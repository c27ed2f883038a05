pub mod expenses;
pub mod forecast_state;
pub mod scenarios;
