//! Line-oriented server loop
//!
//! Reads requests until EOF and answers each on its own line. A bad line
//! never stops the loop; only I/O failures do.

use crate::protocol;
use relay_task::TaskManager;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

pub async fn serve<R, W>(manager: &TaskManager, mut reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Serving on {} surface", manager.surface_name());
    // Raw bytes: a line that is not UTF-8 gets an error reply, not EOF
    let mut line = Vec::new();
    let mut handled = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let response = protocol::handle_bytes(manager, trim_line_end(&line));
        let mut text = serde_json::to_string(&response)?;
        text.push('\n');
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        handled += 1;
    }

    debug!("Input closed after {} requests", handled);
    Ok(())
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_task::{LocalSurface, TaskManagerConfig};
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_one_response_per_request() {
        let manager = TaskManager::new(
            Arc::new(LocalSurface::new("/nonexistent/shell-for-relay")),
            TaskManagerConfig::default(),
        );
        let input = b"{\"op\":\"stats\"}\n\nnot json\n{\"op\":\"list\"}\n";
        let mut output = Vec::new();

        serve(&manager, &input[..], &mut output).await.unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["total"], 0);
        assert!(responses[1].get("error").is_some());
        assert_eq!(responses[2]["count"], 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_serving() {
        let manager = TaskManager::new(
            Arc::new(LocalSurface::new("/nonexistent/shell-for-relay")),
            TaskManagerConfig::default(),
        );
        let input = b"{\"op\":\"stats\"}\n\xff\xfe bad\n{\"op\":\"list\"}\r\n";
        let mut output = Vec::new();

        serve(&manager, &input[..], &mut output).await.unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["total"], 0);
        assert!(responses[1]["error"]
            .as_str()
            .unwrap()
            .contains("not valid UTF-8"));
        assert_eq!(responses[2]["count"], 0);
    }

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_end(b"abc\n"), b"abc");
        assert_eq!(trim_line_end(b"abc"), b"abc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_submit_then_status() {
        let manager = TaskManager::new(Arc::new(LocalSurface::new("sh")), TaskManagerConfig::default());
        let mut output = Vec::new();
        serve(
            &manager,
            &b"{\"op\":\"submit\",\"command\":\"echo wired\"}\n"[..],
            &mut output,
        )
        .await
        .unwrap();

        let receipt: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(receipt["status"], "running");
        let id = receipt["taskId"].as_str().unwrap().to_string();

        let done = manager
            .wait(&id, std::time::Duration::from_secs(10))
            .await
            .unwrap();
        assert!(done.output.contains("wired"));
    }
}
