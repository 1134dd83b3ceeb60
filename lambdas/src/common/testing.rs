//! Local stand-in for an AWS service endpoint, used to drive the real SDK clients in tests.

use std::sync::{Arc, Mutex};

use aws_sdk_dynamodb::config as dynamodb_config;
use aws_sdk_sqs::config as sqs_config;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const REGION: &str = "us-east-1";

/// Answers every request with the same status and JSON body, recording each request.
pub struct FakeAwsEndpoint {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl FakeAwsEndpoint {
    pub async fn start(status: u16, body: &'static str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream, status, body, Arc::clone(&seen)));
            }
        });

        Ok(Self {
            url,
            requests,
            server,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requests received so far, head and body, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn sqs_client(&self) -> aws_sdk_sqs::Client {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(sqs_config::BehaviorVersion::latest())
            .region(sqs_config::Region::new(REGION))
            .credentials_provider(sqs_config::Credentials::new("test", "test", None, None, "fake"))
            .endpoint_url(&self.url)
            .retry_config(sqs_config::retry::RetryConfig::disabled())
            .build();
        aws_sdk_sqs::Client::from_conf(config)
    }

    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(dynamodb_config::BehaviorVersion::latest())
            .region(dynamodb_config::Region::new(REGION))
            .credentials_provider(dynamodb_config::Credentials::new(
                "test", "test", None, None, "fake",
            ))
            .endpoint_url(&self.url)
            .retry_config(dynamodb_config::retry::RetryConfig::disabled())
            .build();
        aws_sdk_dynamodb::Client::from_conf(config)
    }
}

impl Drop for FakeAwsEndpoint {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn answer(
    mut stream: TcpStream,
    status: u16,
    body: &'static str,
    seen: Arc<Mutex<Vec<String>>>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    if let Ok(mut requests) = seen.lock() {
        requests.push(request);
    }

    let response = format!(
        "HTTP/1.1 {status} Fake\r\n\
         content-type: application/x-amz-json-1.0\r\n\
         content-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Reads one request, body included, as text.
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < head_end + 4 + content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    Some(String::from_utf8_lossy(&buffer).to_string())
}
