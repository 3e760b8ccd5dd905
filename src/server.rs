// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 监听与连接处理
//!
//! 每个配置的监听地址对应一个接受循环，每条连接在独立的任务中处理一个请求后关闭：
//! 1. 读取请求头（直到空行），再按 `Content-Length` 读取请求体；
//! 2. 解析为 `Request` 并交给该地址的 `Router` 分派；
//! 3. 写回响应并关闭连接。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use log::{debug, error, info};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinSet,
    time::{sleep, timeout},
};

use crate::{
    common::html_response,
    config::{Config, Mux},
    exception::Exception,
    handler::HandlerRegistry,
    param::*,
    request::{head_end, Request},
    response::Response,
    router::Router,
    template,
};

/// 并发运行配置中的全部监听地址，所有监听都停止后返回
pub async fn run(config: &Config, registry: &HandlerRegistry) {
    let mut listeners = JoinSet::new();
    for (address, mux) in config.mux() {
        let (address, mux, registry) = (address.clone(), mux.clone(), registry.clone());
        listeners.spawn(async move {
            if let Err(e) = listen(&address, &mux, &registry).await {
                error!("init address={:?} err={:?}", address, e.to_string());
            }
        });
    }
    while listeners.join_next().await.is_some() {}
}

/// 在一个地址上监听并处理请求，只有启动失败时才会返回
pub async fn listen(address: &str, mux: &Mux, registry: &HandlerRegistry) -> Result<(), Exception> {
    let (listener, router) = bind(address, mux, registry).await?;
    serve(listener, Arc::new(router)).await;
    Ok(())
}

/// 构建路由表并绑定端口。`:port` 形式的地址监听所有网卡。
pub async fn bind(
    address: &str,
    mux: &Mux,
    registry: &HandlerRegistry,
) -> Result<(TcpListener, Router), Exception> {
    if !mux.cert().is_empty() {
        return Err(Exception::TlsUnsupported(address.to_string()));
    }
    let router = Router::from_mux(mux, registry)?;

    let socket = match address {
        "" => "0.0.0.0:80".to_string(),
        a if a.starts_with(':') => format!("0.0.0.0{}", a),
        a => a.to_string(),
    };
    let listener = TcpListener::bind(&socket)
        .await
        .map_err(|e| Exception::Io(format!("listen {}", socket), e))?;
    info!("listen address={:?}", address);
    Ok((listener, router))
}

/// 接受循环，不会返回
pub async fn serve(listener: TcpListener, router: Arc<Router>) {
    let mut id: u128 = 0;
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept err={:?}", e.to_string());
                sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立：{}", id, remote_addr);

        let router = Arc::clone(&router);
        tokio::spawn(async move {
            handle_connection(stream, remote_addr, id, router).await;
        });
        id += 1;
    }
}

async fn handle_connection(mut stream: TcpStream, remote_addr: SocketAddr, id: u128, router: Arc<Router>) {
    let buffer = match read_request(&mut stream).await {
        Ok(buffer) if buffer.is_empty() => return,
        Ok(buffer) => buffer,
        Err(Exception::Io(context, e)) => {
            debug!("[ID{}]{}：{}", id, context, e);
            return;
        }
        Err(e) => {
            let _ = stream.write_all(&bad_request(&e, remote_addr).as_bytes()).await;
            let _ = stream.shutdown().await;
            return;
        }
    };

    let response = match Request::try_from(&buffer, id) {
        Ok(request) => {
            let request = request.with_remote_addr(&remote_addr.to_string());
            router.dispatch(&request).await
        }
        Err(e) => bad_request(&e, remote_addr),
    };

    if let Err(e) = stream.write_all(&response.as_bytes()).await {
        debug!("[ID{}]发送响应失败：{}", id, e);
        return;
    }
    let _ = stream.shutdown().await;
    debug!("[ID{}]连接已关闭", id);
}

/// 无法解析的请求：记录日志并返回错误页
fn bad_request(e: &Exception, remote_addr: SocketAddr) -> Response {
    let status = match e {
        Exception::RequestTooLarge => 431,
        Exception::BodyTooLarge => 413,
        Exception::UnsupportedHttpVersion => 505,
        _ => 400,
    };
    info!("http s={} ip={} err={:?}", status, remote_addr, e.to_string());
    html_response(Response::new(), status, template::error_page(status, "/"))
}

/// 读取一个完整请求。对端在发送任何数据之前关闭连接时返回空缓冲区。
async fn read_request(stream: &mut TcpStream) -> Result<Vec<u8>, Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let body_start = loop {
        if let Some(end) = head_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEADER_SIZE {
            return Err(Exception::RequestTooLarge);
        }
        let n = read_chunk(stream, &mut chunk).await?;
        if n == 0 {
            return match buffer.is_empty() {
                true => Ok(buffer),
                false => Err(Exception::MalformedRequest),
            };
        }
        buffer.extend_from_slice(&chunk[..n]);
    };
    if body_start > MAX_HEADER_SIZE {
        return Err(Exception::RequestTooLarge);
    }

    let length = content_length(&buffer[..body_start])?;
    if length > MAX_BODY_SIZE {
        return Err(Exception::BodyTooLarge);
    }
    while buffer.len() < body_start + length {
        let n = read_chunk(stream, &mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(buffer)
}

async fn read_chunk(stream: &mut TcpStream, chunk: &mut [u8]) -> Result<usize, Exception> {
    match timeout(READ_TIMEOUT, stream.read(chunk)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(Exception::Io("read".to_string(), e)),
        Err(_) => Err(Exception::Io(
            "read".to_string(),
            std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout"),
        )),
    }
}

/// 请求体长度。无法解析或多个取值互相矛盾的 `Content-Length` 视为格式错误。
fn content_length(head: &[u8]) -> Result<usize, Exception> {
    let head = String::from_utf8_lossy(head);
    let mut length = None;
    for (name, value) in head.split(CRLF).filter_map(|line| line.split_once(':')) {
        if !name.trim().eq_ignore_ascii_case(HEADER_CONTENT_LENGTH) {
            continue;
        }
        let value: usize = value
            .trim()
            .parse()
            .map_err(|_| Exception::MalformedRequest)?;
        match length {
            Some(previous) if previous != value => return Err(Exception::MalformedRequest),
            _ => length = Some(value),
        }
    }
    Ok(length.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;
    use std::collections::BTreeMap;

    fn mux(kind: &str, url: &str) -> Mux {
        Mux::new(BTreeMap::from([(
            "/".to_string(),
            HandlerConfig::new(kind, url, ""),
        )]))
    }

    async fn exchange(router: Router, raw: &[u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(router)));

        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(raw).await.unwrap();
        // 服务端可能在读完请求前关闭连接，读到错误时保留已收到的部分
        let mut response = Vec::new();
        let mut chunk = [0u8; 1024];
        while let Ok(n) = stream.read(&mut chunk).await {
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_content_length() {
        let length = |head: &[u8]| content_length(head).ok();

        assert_eq!(length(b"POST / HTTP/1.1\r\ncontent-length: 12\r\n\r\n"), Some(12));
        assert_eq!(length(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n"), Some(0));
        assert_eq!(
            length(b"POST / HTTP/1.1\r\nContent-Length: 4\r\nContent-Length: 4\r\n\r\n"),
            Some(4)
        );
        assert_eq!(
            length(b"POST / HTTP/1.1\r\nContent-Length: 10\r\nContent-Length: 5\r\n\r\n"),
            None
        );
        assert_eq!(length(b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n"), None);
    }

    #[tokio::test]
    async fn test_bind_rejects_tls() {
        let config = Config::from_toml_str(
            "[[mux.\"127.0.0.1:0\".cert]]\nroot = \"/\"\nkey = \"k\"\ncrt = \"c\"\n[mux.\"127.0.0.1:0\".h.\"/\"]\nt = \"s\"\n",
        )
        .unwrap();
        let mux = &config.mux()["127.0.0.1:0"];

        match bind("127.0.0.1:0", mux, &HandlerRegistry::default()).await {
            Err(Exception::TlsUnsupported(address)) => assert_eq!(address, "127.0.0.1:0"),
            _ => panic!("expected TlsUnsupported"),
        }
    }

    #[tokio::test]
    async fn test_bind_unknown_handler() {
        match bind("127.0.0.1:0", &mux("?", ""), &HandlerRegistry::default()).await {
            Err(Exception::UnknownHandlerType(tag)) => assert_eq!(tag, "?"),
            _ => panic!("expected UnknownHandlerType"),
        }
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        match bind(&address, &mux("s", ""), &HandlerRegistry::default()).await {
            Err(Exception::Io(context, _)) => assert_eq!(context, format!("listen {}", address)),
            _ => panic!("expected Io"),
        }
    }

    #[tokio::test]
    async fn test_serve_secure_redirect() {
        let (_, router) = bind("127.0.0.1:0", &mux("s", ""), &HandlerRegistry::default())
            .await
            .unwrap();

        let response = exchange(router, b"GET /a?b=1 HTTP/1.1\r\nHost: example.com\r\n\r\n").await;

        assert!(response.starts_with("HTTP/1.1 308 Permanent Redirect\r\n"));
        assert!(response.contains("Location: https://example.com/a?b=1\r\n"));
        assert!(response.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn test_serve_bad_request() {
        let response = exchange(Router::new(), b"NONSENSE\r\n\r\n").await;

        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_serve_header_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEADER_SIZE + 10));
        raw.extend_from_slice(b"\r\n\r\n");

        let response = exchange(Router::new(), &raw).await;

        assert!(response.starts_with("HTTP/1.1 431 "));
    }

    #[tokio::test]
    async fn test_serve_body_too_large() {
        let raw = format!(
            "POST / HTTP/1.1\r\nHost: h\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_SIZE + 1
        );

        let response = exchange(Router::new(), raw.as_bytes()).await;

        assert!(response.starts_with("HTTP/1.1 413 "));
    }

    #[tokio::test]
    async fn test_serve_without_route() {
        let response = exchange(Router::new(), b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n").await;

        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }
}
