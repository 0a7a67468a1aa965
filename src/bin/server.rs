//! HTTP server for the query pipeline
//! Simple HTTP server using tokio and basic HTTP handling

use queryforge::api::{
    ErrorResponse, QueryRequest, SchemaRequest, UploadRequest, UploadResponse,
};
use queryforge::config::ServiceConfig;
use queryforge::error::PipelineError;
use queryforge::llm::LlmClient;
use queryforge::pipeline::Pipeline;
use queryforge::source::{DataSourceDescriptor, MySqlConfig, SourceAdapter};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use uuid::Uuid;

struct AppState {
    config: ServiceConfig,
    pipeline: Pipeline,
    llm: LlmClient,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env();

    println!("Starting QueryForge API Server...");
    println!("Server will run on http://localhost:{}", config.listen_port);

    if config.api_key.is_empty() {
        println!("[WARN] OPENAI_API_KEY not set - generation requests will fail");
    } else {
        println!("[OK] OpenAI API key found");
    }

    // Legacy single-database mode: probe the configured database at boot so
    // operators see connectivity problems early. Non-fatal on exhaustion.
    if std::env::var("DATABASE_HOST").is_ok() {
        probe_legacy_database(&config).await;
    }

    let state = Arc::new(AppState {
        llm: LlmClient::from_config(&config),
        pipeline: Pipeline::new(&config),
        config,
    });

    let listener = TcpListener::bind(("0.0.0.0", state.config.listen_port)).await?;
    println!("[OK] Server listening on port {}", state.config.listen_port);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from {}", addr);
        let state = Arc::clone(&state);
        tokio::spawn(handle_connection(stream, state));
    }
}

async fn probe_legacy_database(config: &ServiceConfig) {
    let legacy = &config.legacy_database;
    let descriptor = DataSourceDescriptor::MySql(MySqlConfig {
        host: legacy.host.clone(),
        port: legacy.port,
        user: legacy.user.clone(),
        password: legacy.password.clone(),
        database: legacy.database.clone(),
    });

    for _ in 0..10 {
        match relational_probe(&descriptor, config).await {
            Ok(()) => {
                println!("[OK] Legacy database reachable");
                return;
            }
            Err(e) => {
                eprintln!("Database not ready yet... retrying ({})", e);
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            }
        }
    }
    eprintln!("[WARN] Legacy database unreachable; continuing without it");
}

async fn relational_probe(
    descriptor: &DataSourceDescriptor,
    config: &ServiceConfig,
) -> Result<(), PipelineError> {
    let adapter = SourceAdapter::new(config.uploads_dir.clone());
    let handle = adapter.build(descriptor).await?;
    let result = handle.probe().await;
    handle.close().await;
    result
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    use tokio::time::{timeout, Duration};

    // Read request with timeout to prevent hanging
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    // Check if we've reached the end of HTTP headers + body
                    if let Ok(s) = std::str::from_utf8(&buffer) {
                        if s.contains("\r\n\r\n") {
                            if let Some(content_length) = extract_content_length(s) {
                                let headers_end = s.find("\r\n\r\n").unwrap_or(0) + 4;
                                if buffer.len() >= headers_end + content_length {
                                    break; // We have the complete request
                                }
                            } else if n < temp_buf.len() {
                                // No content-length header and a short read
                                break;
                            }
                        }
                    }
                    // Bound request size
                    if buffer.len() > 10_000_000 {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from stream: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    })
    .await;

    if read_result.is_err() {
        warn!("Request read timeout");
        return;
    }

    if buffer.is_empty() {
        return;
    }

    match String::from_utf8(buffer) {
        Ok(request) => {
            let response = handle_request(&request, &state).await;
            if let Err(e) = stream.write_all(response.as_bytes()).await {
                warn!("Failed to write response: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to parse request as UTF-8: {}", e);
        }
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

async fn handle_request(request: &str, state: &AppState) -> String {
    let request_line = match request.lines().next() {
        Some(line) => line,
        None => return create_response(400, "Bad Request", "{}"),
    };
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let mut path = parts[1].trim_end_matches('/');
    if path.is_empty() {
        path = "/";
    }

    let request_id = Uuid::new_v4();
    info!("[{}] {} {}", request_id, method, path);

    match (method, path) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/") => create_response(200, "OK", r#"{"status":"ok"}"#),
        ("POST", "/query") => match parse_body::<QueryRequest>(request) {
            Ok(body) => handle_query(body, state, request_id).await,
            Err(message) => error_response(400, "Bad Request", &message),
        },
        ("POST", "/schema") => match parse_body::<SchemaRequest>(request) {
            Ok(body) => handle_schema(body, state, request_id).await,
            Err(message) => error_response(400, "Bad Request", &message),
        },
        ("POST", "/upload") => match parse_body::<UploadRequest>(request) {
            Ok(body) => handle_upload(body, state, request_id).await,
            Err(message) => error_response(400, "Bad Request", &message),
        },
        _ => error_response(404, "Not Found", "Not found"),
    }
}

async fn handle_query(body: QueryRequest, state: &AppState, request_id: Uuid) -> String {
    let descriptor = match &body.db_connection {
        Some(connection) => match connection.descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => return pipeline_error_response(&e),
        },
        // Legacy single-database mode
        None => {
            let legacy = &state.config.legacy_database;
            DataSourceDescriptor::MySql(MySqlConfig {
                host: legacy.host.clone(),
                port: legacy.port,
                user: legacy.user.clone(),
                password: legacy.password.clone(),
                database: legacy.database.clone(),
            })
        }
    };

    match state
        .pipeline
        .run_query(&state.llm, &descriptor, &body.question, &body.history)
        .await
    {
        Ok(response) => json_response(200, "OK", &response),
        Err(e) => {
            warn!("[{}] Query failed: {}", request_id, e);
            pipeline_error_response(&e)
        }
    }
}

async fn handle_schema(body: SchemaRequest, state: &AppState, request_id: Uuid) -> String {
    let descriptor = match body.db_connection.descriptor() {
        Ok(descriptor) => descriptor,
        Err(e) => return pipeline_error_response(&e),
    };

    match state.pipeline.fetch_schema(&descriptor).await {
        Ok(response) => json_response(200, "OK", &response),
        Err(e) => {
            warn!("[{}] Schema fetch failed: {}", request_id, e);
            pipeline_error_response(&e)
        }
    }
}

async fn handle_upload(body: UploadRequest, state: &AppState, request_id: Uuid) -> String {
    // Only the basename is honored, mirroring how csvPath references are
    // resolved later.
    let filename = match Path::new(&body.filename).file_name() {
        Some(name) => name.to_owned(),
        None => return error_response(400, "Bad Request", "invalid filename"),
    };

    let uploads_dir = &state.config.uploads_dir;
    if let Err(e) = std::fs::create_dir_all(uploads_dir) {
        warn!("[{}] Upload failed: {}", request_id, e);
        return error_response(500, "Internal Server Error", &e.to_string());
    }

    let path = uploads_dir.join(&filename);
    match std::fs::write(&path, &body.content) {
        Ok(()) => json_response(
            200,
            "OK",
            &UploadResponse {
                path: filename.to_string_lossy().to_string(),
            },
        ),
        Err(e) => {
            warn!("[{}] Upload failed: {}", request_id, e);
            error_response(500, "Internal Server Error", &e.to_string())
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(request: &str) -> Result<T, String> {
    let body_start = request.find("\r\n\r\n").map(|p| p + 4).unwrap_or(request.len());
    let body = request[body_start..].trim();
    let json_str = match body.find('{') {
        Some(start) => &body[start..],
        None => return Err("JSON body required".to_string()),
    };
    serde_json::from_str(json_str).map_err(|e| format!("Invalid request body: {}", e))
}

fn pipeline_error_response(error: &PipelineError) -> String {
    if error.is_client_error() {
        error_response(400, "Bad Request", &error.to_string())
    } else {
        error_response(500, "Internal Server Error", &error.to_string())
    }
}

fn error_response(status: u16, status_text: &str, message: &str) -> String {
    let body = serde_json::to_string(&ErrorResponse::new(message))
        .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string());
    create_response(status, status_text, &body)
}

fn json_response<T: serde::Serialize>(status: u16, status_text: &str, body: &T) -> String {
    match serde_json::to_string(body) {
        Ok(json) => create_response(status, status_text, &json),
        Err(e) => error_response(500, "Internal Server Error", &e.to_string()),
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
