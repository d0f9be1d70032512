use actix_web::web;
mod handlers;

pub use handlers::json_error_handler;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::get_balance)
        .service(handlers::get_portfolio)
        .service(handlers::health);
}
