//! 길이 제한이 있는 라인 분리기
//!
//! 개행 기준으로 라인을 나누고 끝의 `\r`을 제거합니다. 한 라인이 `max_len`을 넘으면
//! 앞부분만 남기고 나머지는 개행까지 버립니다. 마지막 라인에 개행이 없어도
//! EOF에서 한 라인으로 돌려줍니다.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// 라인 최대 길이 (바이트)
pub const MAX_LINE_BYTES: usize = 256 * 1024;

/// 읽기 버퍼 크기
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// 비동기 리더에서 라인을 하나씩 꺼냅니다.
pub struct BoundedLines<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    max_len: usize,
    truncated: u64,
}

impl<R: AsyncRead + Unpin> BoundedLines<R> {
    /// 기본 최대 길이로 생성합니다.
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_LINE_BYTES)
    }

    /// 최대 길이를 지정해 생성합니다.
    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_BYTES, reader),
            line: Vec::new(),
            max_len,
            truncated: 0,
        }
    }

    /// 지금까지 잘린 라인 수
    pub fn truncated(&self) -> u64 {
        self.truncated
    }

    /// 다음 라인. EOF면 `None`입니다.
    pub async fn next_line(&mut self) -> std::io::Result<Option<&[u8]>> {
        self.line.clear();
        let mut saw_bytes = false;
        let mut overflowed = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if !saw_bytes {
                    return Ok(None);
                }
                break;
            }
            saw_bytes = true;

            let (chunk, consumed, done) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (&available[..pos], pos + 1, true),
                None => (available, available.len(), false),
            };
            let room = self.max_len.saturating_sub(self.line.len());
            if chunk.len() > room {
                overflowed = true;
            }
            self.line.extend_from_slice(&chunk[..chunk.len().min(room)]);
            self.reader.consume(consumed);

            if done {
                break;
            }
        }

        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        if overflowed {
            self.truncated += 1;
            tracing::debug!(max_len = self.max_len, "overlong line truncated");
        }
        Ok(Some(&self.line))
    }
}
