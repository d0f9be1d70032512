//! Local HTTP upstream for exercising the real clients end to end.

use std::sync::{Arc, Mutex};

use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path and query exactly as received.
    pub uri: String,
    /// JSON body, `Null` when absent or not JSON.
    pub body: Value,
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> (StatusCode, Value) + Send + Sync>;

pub struct MockUpstream {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    /// Serves every path with `respond`. Must run inside an actix system.
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond: Responder = Arc::new(respond);
        let shared = (requests.clone(), respond);

        let server = HttpServer::new(move || {
            let (requests, respond) = shared.clone();
            App::new().default_service(web::to(move |req: HttpRequest, body: web::Bytes| {
                let requests = requests.clone();
                let respond = respond.clone();
                async move {
                    let recorded = RecordedRequest {
                        uri: req.uri().to_string(),
                        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
                    };
                    let (status, reply) = respond(&recorded);
                    requests.lock().unwrap().push(recorded);
                    HttpResponse::build(status).json(reply)
                }
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());

        Self {
            url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl RecordedRequest {
    pub fn rpc_method(&self) -> &str {
        self.body["method"].as_str().unwrap_or_default()
    }
}

/// JSON-RPC success envelope answering `req`.
pub fn rpc_result(req: &RecordedRequest, result: Value) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({"jsonrpc": "2.0", "id": req.body["id"], "result": result}),
    )
}

/// JSON-RPC error envelope answering `req`.
pub fn rpc_error(
    req: &RecordedRequest,
    status: StatusCode,
    code: i64,
    message: &str,
) -> (StatusCode, Value) {
    (
        status,
        json!({
            "jsonrpc": "2.0",
            "id": req.body["id"],
            "error": {"code": code, "message": message}
        }),
    )
}
