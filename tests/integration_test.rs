use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use servhttp::{
    config::{HandlerConfig, Mux},
    server, template, HandlerRegistry,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

/// 发送原始请求并读取完整响应（服务器每个请求后关闭连接）
async fn send_request(request: &str, address: SocketAddr) -> Result<String, String> {
    let mut stream = TcpStream::connect(address)
        .await
        .map_err(|e| e.to_string())?;
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| e.to_string())?;

    let mut response = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .map_err(|_| "timeout".to_string())?
        .map_err(|e| e.to_string())?;

    Ok(String::from_utf8_lossy(&response).to_string())
}

fn parse_response(response: &str) -> (u16, Vec<(String, String)>, String) {
    let lines: Vec<&str> = response.split("\r\n").collect();

    // 解析状态行
    let status_code = lines[0]
        .split_whitespace()
        .nth(1)
        .unwrap_or("0")
        .parse::<u16>()
        .unwrap_or(0);

    // 解析头部
    let mut headers = Vec::new();
    let mut i = 1;
    while i < lines.len() && !lines[i].is_empty() {
        if let Some((key, value)) = lines[i].split_once(": ") {
            headers.push((key.to_string(), value.to_string()));
        }
        i += 1;
    }

    // 解析主体
    let body = if i + 1 < lines.len() {
        lines[i + 1..].join("\r\n")
    } else {
        String::new()
    };

    (status_code, headers, body)
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// 测试站点：
/// - site/ 由内存缓存处理器提供（挂在 `/`）
/// - files/ 由文件处理器提供（挂在 `/files/`）
fn site() -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("site/docs")).unwrap();
    std::fs::create_dir_all(tmp.path().join("files")).unwrap();
    std::fs::write(tmp.path().join("site/hello.txt"), b"Hello World").unwrap();
    std::fs::write(tmp.path().join("site/index.html"), b"<h1>home</h1>").unwrap();
    std::fs::write(tmp.path().join("site/docs/a.css"), b"body{}").unwrap();
    std::fs::write(tmp.path().join("files/data.json"), b"{\"a\":1}").unwrap();
    tmp
}

async fn start_server(tmp: &TempDir) -> SocketAddr {
    let root = tmp.path().to_str().unwrap();
    let site = tmp.path().join("site");
    let mux = Mux::new(BTreeMap::from([
        (
            "/".to_string(),
            HandlerConfig::new("m", site.to_str().unwrap(), "max-age=60"),
        ),
        ("/files/".to_string(), HandlerConfig::new("f", root, "no-cache")),
        (
            "/old/".to_string(),
            HandlerConfig::new("r", "https://new.example.com/", ""),
        ),
        ("secure.example.com/".to_string(), HandlerConfig::new("s", "", "")),
    ]));

    let (listener, router) = server::bind("127.0.0.1:0", &mux, &HandlerRegistry::default())
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, Arc::new(router)));

    // 等待缓存处理器完成第一次构建
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = send_request("GET /hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        if parse_response(&response).0 == 200 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "cache was never built");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    address
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_request_basic() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let response = send_request("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        assert_eq!(body, "<h1>home</h1>");
        assert_eq!(header(&headers, "Content-Length"), Some("13"));
        assert_eq!(header(&headers, "Cache-Control"), Some("max-age=60"));
        assert_eq!(header(&headers, "Server"), Some("servhttp"));
        assert_eq!(header(&headers, "Connection"), Some("close"));
        assert!(header(&headers, "ETag").is_some());
        assert!(header(&headers, "Date").is_some());
    }

    #[tokio::test]
    async fn test_head_request() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let response = send_request("HEAD /hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        // HEAD 请求不应该有响应体，但保留 Content-Length
        assert!(body.is_empty());
        assert_eq!(header(&headers, "Content-Length"), Some("11"));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let tmp = site();
        let address = start_server(&tmp).await;

        for method in ["POST", "PUT", "DELETE"] {
            let request = format!(
                "{} /hello.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n",
                method
            );
            let response = send_request(&request, address).await.unwrap();
            assert_eq!(parse_response(&response).0, 405, "method {}", method);
        }
    }

    #[tokio::test]
    async fn test_not_found() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let response = send_request("GET /nope.html HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, body) = parse_response(&response);

        assert_eq!(status_code, 404);
        assert_eq!(header(&headers, "Content-Type"), Some("text/html; charset=utf-8"));
        assert_eq!(
            body.as_bytes(),
            template::error_page(404, "/nope.html").as_slice()
        );
        assert!(body.contains(r#"<a href="">nope.html</a>"#));
    }

    #[tokio::test]
    async fn test_directory_redirect() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let response = send_request("GET /docs?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, _) = parse_response(&response);
        assert_eq!(status_code, 301);
        assert_eq!(header(&headers, "Location"), Some("/docs/?x=1"));

        let response = send_request("GET /docs/ HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, _, body) = parse_response(&response);
        assert_eq!(status_code, 200);
        assert!(body.contains("a.css"));
    }

    #[tokio::test]
    async fn test_file_handler_route() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let response = send_request("GET /files/data.json HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        assert_eq!(body, "{\"a\":1}");
        assert_eq!(header(&headers, "Content-Type"), Some("application/json"));
        assert_eq!(header(&headers, "Cache-Control"), Some("no-cache"));
        let last_modified = header(&headers, "Last-Modified").unwrap().to_string();

        let request = format!(
            "GET /files/data.json HTTP/1.1\r\nHost: localhost\r\nIf-Modified-Since: {}\r\n\r\n",
            last_modified
        );
        let response = send_request(&request, address).await.unwrap();
        assert_eq!(parse_response(&response).0, 304);

        // 只注册了 `/files/`，访问 `/files` 时由路由补上斜杠
        let response = send_request("GET /files HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, _) = parse_response(&response);
        assert_eq!(status_code, 301);
        assert_eq!(header(&headers, "Location"), Some("/files/"));
    }

    #[tokio::test]
    async fn test_redirect_routes() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let response = send_request("GET /old/page?id=7 HTTP/1.1\r\nHost: localhost\r\n\r\n", address)
            .await
            .unwrap();
        let (status_code, headers, _) = parse_response(&response);
        assert_eq!(status_code, 308);
        assert_eq!(
            header(&headers, "Location"),
            Some("https://new.example.com/old/page?id=7")
        );

        let response = send_request(
            "GET /hello.txt HTTP/1.1\r\nHost: secure.example.com:8080\r\n\r\n",
            address,
        )
        .await
        .unwrap();
        let (status_code, headers, _) = parse_response(&response);
        assert_eq!(status_code, 308);
        assert_eq!(
            header(&headers, "Location"),
            Some("https://secure.example.com:8080/hello.txt")
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let tmp = site();
        let address = start_server(&tmp).await;

        let mut handles = vec![];
        for _ in 0..10 {
            handles.push(tokio::spawn(async move {
                send_request("GET /hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n", address).await
            }));
        }

        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            let (status_code, _, body) = parse_response(&response);
            assert_eq!(status_code, 200);
            assert_eq!(body, "Hello World");
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\n\r\nHello";
        let (status, headers, body) = parse_response(response);

        assert_eq!(status, 200);
        assert_eq!(headers.len(), 2);
        assert_eq!(header(&headers, "content-type"), Some("text/html"));
        assert_eq!(body, "Hello");
    }

    #[test]
    fn test_parse_response_without_body() {
        let response = "HTTP/1.1 304 Not Modified\r\nETag: \"x\"\r\n\r\n";
        let (status, headers, body) = parse_response(response);

        assert_eq!(status, 304);
        assert_eq!(header(&headers, "etag"), Some("\"x\""));
        assert!(body.is_empty());
    }
}
