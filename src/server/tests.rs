//! Server Module Tests
//!
//! ## Test Scopes
//! - **Connection**: Every verb driven sans-socket, with input split into arbitrary
//!   chunks and responses captured in a `Vec<u8>`.
//! - **Errors**: Bad verbs, unknown files, oversize headers, truncated payloads and
//!   the cleanup a failed upload leaves behind.
//! - **Listener**: A real `FileServer` on `127.0.0.1:0`, error framing on the wire, shutdown.

#[cfg(test)]
mod tests {
    use crate::config::Limits;
    use crate::server::connection::Connection;
    use crate::server::context::ServerContext;
    use crate::server::handlers::parse_manifest;
    use crate::server::listener::FileServer;
    use crate::server::types::Phase;
    use crate::storage::types::ServerNode;

    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn context_with(limits: Limits) -> (TempDir, Arc<ServerContext>) {
        let dir = TempDir::new().unwrap();
        let ctx = ServerContext::open(dir.path(), limits).await.unwrap();
        (dir, ctx)
    }

    async fn context() -> (TempDir, Arc<ServerContext>) {
        context_with(Limits::default()).await
    }

    /// Runs one connection over `chunks`, then signals EOF if it is still open.
    async fn drive(ctx: &ServerContext, chunks: &[&[u8]]) -> (Phase, Vec<u8>) {
        let mut conn = Connection::new();
        let mut out = Vec::new();

        for chunk in chunks {
            let phase = conn.advance(chunk, ctx, &mut out).await.unwrap();
            if phase.is_terminal() {
                return (phase, out);
            }
        }
        (conn.finish_input(ctx).await, out)
    }

    async fn drive_bytewise(ctx: &ServerContext, bytes: &[u8]) -> (Phase, Vec<u8>) {
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        drive(ctx, &chunks).await
    }

    fn put_request(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = format!("PUT {}\n", name).into_bytes();
        bytes.extend_from_slice(&(payload.len() as u64).to_ne_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn add_server_request(node: &ServerNode, manifest: &str) -> Vec<u8> {
        let mut bytes = format!("ADD_SERVER {} {}\n", node.address, node.port).into_bytes();
        bytes.extend_from_slice(&(manifest.len() as u64).to_ne_bytes());
        bytes.extend_from_slice(manifest.as_bytes());
        bytes
    }

    fn list_response(blob: &str) -> Vec<u8> {
        let mut bytes = b"OK\n".to_vec();
        bytes.extend_from_slice(&(blob.len() as u64).to_ne_bytes());
        bytes.extend_from_slice(blob.as_bytes());
        bytes
    }

    fn secondary() -> ServerNode {
        ServerNode::new("10.0.0.2", 9000)
    }

    // ============================================================
    // LIST / GET TESTS
    // ============================================================

    #[tokio::test]
    async fn test_list_empty_directory() {
        let (_dir, ctx) = context().await;

        let (phase, out) = drive(&ctx, &[b"LIST\n"]).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, list_response(""));
    }

    #[tokio::test]
    async fn test_list_bytewise_matches_whole() {
        let (dir, ctx) = context().await;
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        ctx.files.add("b.txt");
        ctx.files.add("a.txt");

        let (phase, out) = drive_bytewise(&ctx, b"LIST\n").await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, list_response("a.txt\nb.txt"));
    }

    #[tokio::test]
    async fn test_list_includes_names_held_elsewhere() {
        let (_dir, ctx) = context().await;
        ctx.files.add("local.txt");
        ctx.shards
            .register_node(secondary(), vec!["remote.txt".to_string(), "local.txt".to_string()])
            .await;

        let (_, out) = drive(&ctx, &[b"LIST\n"]).await;

        assert_eq!(out, list_response("local.txt\nremote.txt"));
    }

    #[tokio::test]
    async fn test_get_local_file_in_two_chunks() {
        let (dir, ctx) = context().await;
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        ctx.files.add("a.txt");

        let (phase, out) = drive(&ctx, &[b"GET a.t", b"xt\n"]).await;

        let mut expected = b"OK\n0.0.0.0\n0\n".to_vec();
        expected.extend_from_slice(&5u64.to_ne_bytes());
        expected.extend_from_slice(b"hello");
        assert_eq!(phase, Phase::Done);
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_get_unknown_file() {
        let (_dir, ctx) = context().await;

        let (phase, out) = drive(&ctx, &[b"GET nope.txt\n"]).await;

        assert_eq!(phase, Phase::InvalidFile);
        assert!(out.is_empty(), "Error framing is written by the listener");
    }

    #[tokio::test]
    async fn test_get_listed_but_missing_on_disk() {
        let (_dir, ctx) = context().await;
        ctx.files.add("ghost.txt");

        let (phase, _) = drive(&ctx, &[b"GET ghost.txt\n"]).await;

        assert_eq!(phase, Phase::InvalidFile);
    }

    #[tokio::test]
    async fn test_get_redirects_to_owner() {
        let (_dir, ctx) = context().await;
        ctx.shards
            .register_node(secondary(), vec!["far.txt".to_string()])
            .await;

        let (phase, out) = drive(&ctx, &[b"GET far.txt\n"]).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n10.0.0.2\n9000\n");
    }

    // ============================================================
    // PUT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_put_bytewise_stores_file() {
        let (dir, ctx) = context().await;

        let (phase, out) = drive_bytewise(&ctx, &put_request("new.txt", b"hello")).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n0.0.0.0\n0\nOK\n");
        assert!(ctx.files.contains("new.txt"));
        assert_eq!(std::fs::read(dir.path().join("new.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_put_empty_file() {
        let (dir, ctx) = context().await;

        let (phase, out) = drive(&ctx, &[&put_request("empty", b"")]).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n0.0.0.0\n0\nOK\n");
        assert_eq!(std::fs::read(dir.path().join("empty")).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_file() {
        let (dir, ctx) = context().await;
        std::fs::write(dir.path().join("a.txt"), b"old contents").unwrap();
        ctx.files.add("a.txt");

        let (phase, _) = drive(&ctx, &[&put_request("a.txt", b"new")]).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"new");
        assert_eq!(ctx.files.len(), 1);
    }

    #[tokio::test]
    async fn test_put_truncated_payload_is_discarded() {
        let (dir, ctx) = context().await;
        let request = put_request("big.bin", b"0123456789");

        // Stop three bytes short of the declared size.
        let (phase, out) = drive(&ctx, &[&request[..request.len() - 3]]).await;

        assert_eq!(phase, Phase::IncorrectDataAmount);
        assert_eq!(out, b"OK\n0.0.0.0\n0\n");
        assert!(!ctx.files.contains("big.bin"));
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn test_put_eof_inside_size_field() {
        let (_dir, ctx) = context().await;
        let request = put_request("x", b"abc");
        let header_len = "PUT x\n".len();

        let (phase, _) = drive(&ctx, &[&request[..header_len + 4]]).await;

        assert_eq!(phase, Phase::IncorrectDataAmount);
        assert!(!ctx.files.contains("x"));
    }

    #[tokio::test]
    async fn test_put_redirects_round_robin() {
        let (_dir, ctx) = context().await;
        ctx.shards.register_node(secondary(), Vec::new()).await;

        let (phase, out) = drive(&ctx, &[b"PUT first\n"]).await;
        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n10.0.0.2\n9000\n");
        assert!(!ctx.files.contains("first"));

        // Next slot is this node.
        let (phase, out) = drive(&ctx, &[&put_request("second", b"2")]).await;
        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n0.0.0.0\n0\nOK\n");
        assert!(ctx.files.contains("second"));
    }

    #[tokio::test]
    async fn test_put_rejects_path_traversal() {
        let (_dir, ctx) = context().await;

        let (phase, out) = drive(&ctx, &[b"PUT ../escape\n"]).await;

        assert_eq!(phase, Phase::InvalidFile);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_put_onto_directory_is_rejected() {
        let (dir, ctx) = context().await;
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let (phase, out) = drive(&ctx, &[&put_request("sub", b"data")]).await;

        assert_eq!(phase, Phase::InvalidFile);
        assert!(out.is_empty());
        assert!(!ctx.files.contains("sub"));
        assert!(dir.path().join("sub").is_dir());
    }

    // ============================================================
    // DELETE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_delete_then_delete_again() {
        let (dir, ctx) = context().await;
        std::fs::write(dir.path().join("d.txt"), b"x").unwrap();
        ctx.files.add("d.txt");

        let (phase, out) = drive(&ctx, &[b"DELETE d.txt\n"]).await;
        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n");
        assert!(!dir.path().join("d.txt").exists());

        let (phase, _) = drive(&ctx, &[b"DELETE d.txt\n"]).await;
        assert_eq!(phase, Phase::InvalidFile);
    }

    #[tokio::test]
    async fn test_delete_does_not_touch_remote_names() {
        let (_dir, ctx) = context().await;
        ctx.shards
            .register_node(secondary(), vec!["far.txt".to_string()])
            .await;

        let (phase, _) = drive(&ctx, &[b"DELETE far.txt\n"]).await;

        assert_eq!(phase, Phase::InvalidFile);
        assert_eq!(ctx.shards.owner_of("far.txt"), Some(secondary()));
    }

    // ============================================================
    // ADD_SERVER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_add_server_registers_node_and_files() {
        let (_dir, ctx) = context().await;
        let request = add_server_request(&secondary(), "x.txt\ny.txt\n\n");

        let (phase, out) = drive_bytewise(&ctx, &request).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n");
        assert_eq!(ctx.shards.nodes().await, vec![secondary()]);
        assert_eq!(ctx.shards.owner_of("x.txt"), Some(secondary()));
        assert_eq!(ctx.shards.owner_of("y.txt"), Some(secondary()));
    }

    #[tokio::test]
    async fn test_add_server_empty_manifest() {
        let (_dir, ctx) = context().await;

        let (phase, out) = drive(&ctx, &[&add_server_request(&secondary(), "")]).await;

        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n");
        assert_eq!(ctx.shards.nodes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_server_malformed_announcement() {
        let (_dir, ctx) = context().await;

        let (phase, _) = drive(&ctx, &[b"ADD_SERVER 10.0.0.2\n"]).await;

        assert_eq!(phase, Phase::InvalidVerb);
        assert!(ctx.shards.nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_server_rejects_redirect_sentinel_address() {
        let (_dir, ctx) = context().await;
        let sentinel = ServerNode::new("0.0.0.0", 9000);

        let (phase, _) = drive(&ctx, &[&add_server_request(&sentinel, "")]).await;

        assert_eq!(phase, Phase::InvalidVerb);
        assert!(ctx.shards.nodes().await.is_empty());

        // With no secondaries every PUT stays local.
        let (phase, out) = drive(&ctx, &[&put_request("kept", b"k")]).await;
        assert_eq!(phase, Phase::Done);
        assert_eq!(out, b"OK\n0.0.0.0\n0\nOK\n");
        assert!(ctx.files.contains("kept"));
    }

    #[tokio::test]
    async fn test_add_server_manifest_over_limit() {
        let limits = Limits {
            max_manifest_len: 4,
            ..Limits::default()
        };
        let (_dir, ctx) = context_with(limits).await;

        let request = add_server_request(&secondary(), "toolong");
        let (phase, _) = drive(&ctx, &[&request]).await;

        assert_eq!(phase, Phase::IncorrectDataAmount);
        assert!(ctx.shards.nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_server_truncated_manifest() {
        let (_dir, ctx) = context().await;
        let request = add_server_request(&secondary(), "abc");

        let (phase, _) = drive(&ctx, &[&request[..request.len() - 1]]).await;

        assert_eq!(phase, Phase::IncorrectDataAmount);
        assert!(ctx.shards.nodes().await.is_empty());
    }

    #[test]
    fn test_parse_manifest_skips_blank_and_unusable_lines() {
        let names = parse_manifest("a.txt\n\n../b\nc.txt");
        assert_eq!(names, vec!["a.txt".to_string(), "c.txt".to_string()]);
    }

    // ============================================================
    // PARSE ERROR / EOF TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unknown_verb() {
        let (_dir, ctx) = context().await;
        let (phase, _) = drive(&ctx, &[b"FETCH a.txt\n"]).await;
        assert_eq!(phase, Phase::InvalidVerb);
    }

    #[tokio::test]
    async fn test_header_path_too_long() {
        let limits = Limits {
            max_header_len: 16,
            ..Limits::default()
        };
        let (_dir, ctx) = context_with(limits).await;
        let request = format!("GET {}\n", "x".repeat(32));

        let (phase, _) = drive(&ctx, &[request.as_bytes()]).await;

        assert_eq!(phase, Phase::IncorrectDataAmount);
    }

    #[tokio::test]
    async fn test_eof_before_any_byte_is_clean() {
        let (_dir, ctx) = context().await;
        let (phase, out) = drive(&ctx, &[]).await;
        assert_eq!(phase, Phase::Done);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_eof_mid_verb() {
        let (_dir, ctx) = context().await;
        let (phase, _) = drive(&ctx, &[b"DEL"]).await;
        assert_eq!(phase, Phase::InvalidVerb);
    }

    #[tokio::test]
    async fn test_eof_mid_path() {
        let (_dir, ctx) = context().await;
        let (phase, _) = drive(&ctx, &[b"GET unterminated"]).await;
        assert_eq!(phase, Phase::IncorrectDataAmount);
    }

    #[tokio::test]
    async fn test_bytes_after_done_are_ignored() {
        let (_dir, ctx) = context().await;
        let mut conn = Connection::new();
        let mut out = Vec::new();

        let phase = conn.advance(b"LIST\nGARBAGE", &ctx, &mut out).await.unwrap();
        assert_eq!(phase, Phase::Done);

        let phase = conn.advance(b"more", &ctx, &mut out).await.unwrap();
        assert_eq!(phase, Phase::Done);
        assert_eq!(out, list_response(""));
        assert_eq!(conn.bytes_received(), 16);
    }

    // ============================================================
    // LISTENER TESTS
    // ============================================================

    async fn start_server() -> (TempDir, Arc<ServerContext>, std::net::SocketAddr) {
        let (dir, ctx) = context().await;
        let server = FileServer::bind("127.0.0.1:0".parse().unwrap(), ctx.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (dir, ctx, addr)
    }

    async fn exchange(addr: std::net::SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_listener_frames_errors() {
        let (_dir, _ctx, addr) = start_server().await;

        assert_eq!(exchange(addr, b"GEX\n").await, b"ERROR\nBad request\n");
        assert_eq!(exchange(addr, b"GET none\n").await, b"ERROR\nNo such file\n");
        assert_eq!(exchange(addr, b"GET none").await, b"ERROR\nBad file size\n");
    }

    #[tokio::test]
    async fn test_listener_error_survives_unread_request_bytes() {
        let (_dir, _ctx, addr) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Everything after the bad verb is still in flight when the server gives up.
        let mut request = b"GEX\n".to_vec();
        request.extend(std::iter::repeat_n(b'x', 64 * 1024));
        stream.write_all(&request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.shutdown().await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"ERROR\nBad request\n");
    }

    #[tokio::test]
    async fn test_listener_serves_concurrent_connections() {
        let (_dir, ctx, addr) = start_server().await;

        // An idle, half-finished request must not block other clients.
        let mut idle = TcpStream::connect(addr).await.unwrap();
        idle.write_all(b"PUT slow.txt\n").await.unwrap();

        let response = exchange(addr, &put_request("fast.txt", b"quick")).await;
        assert_eq!(response, b"OK\n0.0.0.0\n0\nOK\n");
        assert!(ctx.files.contains("fast.txt"));

        drop(idle);
    }

    #[tokio::test]
    async fn test_listener_stops_on_shutdown() {
        let (_dir, ctx) = context().await;
        let server = FileServer::bind("127.0.0.1:0".parse().unwrap(), ctx.clone())
            .await
            .unwrap();
        let handle = tokio::spawn(server.run());

        ctx.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert!(ctx.is_shutting_down());
    }
}
