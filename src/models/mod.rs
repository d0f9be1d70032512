pub mod api_response;
pub mod balance;
pub mod chain;
pub mod price;
pub mod token;
