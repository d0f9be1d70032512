use actix_web::{error::JsonPayloadError, get, post, web, HttpRequest, HttpResponse};
use log::{error, info};
use uuid::Uuid;

use crate::{
    errors::CustomError,
    models::{
        api_response::HealthStatus,
        balance::{BalanceQuery, BalanceRequest, NormalizedBalance},
    },
    state::AppState,
};

/// Rejects undecodable bodies with the same 400 shape as a missing field.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    info!("Rejected balance request body: {}", err);
    CustomError::ValidationError("Blockchain and address are required".to_string()).into()
}

async fn lookup(
    state: &AppState,
    request: &BalanceRequest,
    request_id: Uuid,
) -> Result<(BalanceQuery, NormalizedBalance), CustomError> {
    let result = match BalanceQuery::from_request(request) {
        Ok(query) => state
            .balances
            .get_balance(&query)
            .await
            .map(|balance| (query, balance)),
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        let chain = request.blockchain.as_deref().unwrap_or("-");
        let address = request.address.as_deref().unwrap_or("-");
        if e.is_bad_request() {
            info!("[{}] Rejected {} / {}: {}", request_id, chain, address, e);
        } else {
            error!("[{}] Error fetching {} balance for {}: {:?}", request_id, chain, address, e);
        }
    }

    result
}

#[post("/balance")]
async fn get_balance(
    state: web::Data<AppState>,
    body: web::Json<BalanceRequest>,
) -> Result<HttpResponse, CustomError> {
    let request_id = Uuid::new_v4();
    info!("[{}] Balance request for {:?} {:?}", request_id, body.blockchain, body.address);

    let (_, balance) = lookup(&state, &body, request_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

/// Same lookup as `/balance`, with USD prices attached where known.
#[post("/portfolio")]
async fn get_portfolio(
    state: web::Data<AppState>,
    body: web::Json<BalanceRequest>,
) -> Result<HttpResponse, CustomError> {
    let request_id = Uuid::new_v4();
    info!("[{}] Portfolio request for {:?} {:?}", request_id, body.blockchain, body.address);

    let (query, balance) = lookup(&state, &body, request_id).await?;
    let priced = state.prices.enrich(query.chain, balance).await;
    Ok(HttpResponse::Ok().json(priced))
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthStatus { status: "ok" })
}
