//! Device-status-report interception for PTY output.
//!
//! Assistant CLIs probe the cursor position with `ESC[6n` and stall until a
//! terminal answers. With no real terminal behind the PTY we strip the query
//! from the stream and let the caller answer "row 1, column 1".

use std::mem;

/// Cursor position request (DSR 6).
pub(crate) const CURSOR_POSITION_QUERY: &[u8] = b"\x1b[6n";
/// Synthetic reply: cursor at row 1, column 1.
pub(crate) const CURSOR_POSITION_REPLY: &[u8] = b"\x1b[1;1R";

/// Chunk output with queries removed, plus how many replies are owed.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Filtered {
    pub(crate) output: Vec<u8>,
    pub(crate) replies: usize,
}

/// Strips cursor-position queries, including ones split across reads.
#[derive(Debug, Default)]
pub(crate) struct QueryFilter {
    pending: Vec<u8>,
}

impl QueryFilter {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Filtered {
        let mut data = mem::take(&mut self.pending);
        data.extend_from_slice(chunk);

        let mut filtered = Filtered {
            output: Vec::with_capacity(data.len()),
            replies: 0,
        };
        let mut idx = 0;
        while idx < data.len() {
            let rest = &data[idx..];
            if rest.starts_with(CURSOR_POSITION_QUERY) {
                filtered.replies += 1;
                idx += CURSOR_POSITION_QUERY.len();
                continue;
            }
            if rest.len() < CURSOR_POSITION_QUERY.len() && CURSOR_POSITION_QUERY.starts_with(rest)
            {
                // Possible query cut by the read boundary; hold it for the next chunk.
                self.pending = rest.to_vec();
                break;
            }
            filtered.output.push(data[idx]);
            idx += 1;
        }
        filtered
    }

    /// Release bytes held back at end of stream; they were never a full query.
    pub(crate) fn finish(&mut self) -> Vec<u8> {
        mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query_and_counts_reply() {
        let mut filter = QueryFilter::default();
        let filtered = filter.feed(b"Hello\x1b[6nWorld");
        assert_eq!(filtered.output, b"HelloWorld".to_vec());
        assert_eq!(filtered.replies, 1);
        assert!(filter.finish().is_empty());
    }

    #[test]
    fn counts_every_occurrence() {
        let mut filter = QueryFilter::default();
        let filtered = filter.feed(b"\x1b[6na\x1b[6n\x1b[6nb");
        assert_eq!(filtered.output, b"ab".to_vec());
        assert_eq!(filtered.replies, 3);
    }

    #[test]
    fn joins_query_split_across_chunks() {
        let mut filter = QueryFilter::default();
        let first = filter.feed(b"start\x1b[");
        assert_eq!(first.output, b"start".to_vec());
        assert_eq!(first.replies, 0);

        let second = filter.feed(b"6nend");
        assert_eq!(second.output, b"end".to_vec());
        assert_eq!(second.replies, 1);
    }

    #[test]
    fn leaves_other_escape_sequences_alone() {
        let mut filter = QueryFilter::default();
        let filtered = filter.feed(b"\x1b[31mred\x1b[0m\x1b[5n");
        assert_eq!(filtered.output, b"\x1b[31mred\x1b[0m\x1b[5n".to_vec());
        assert_eq!(filtered.replies, 0);
    }

    #[test]
    fn flushes_unfinished_prefix_at_end_of_stream() {
        let mut filter = QueryFilter::default();
        let filtered = filter.feed(b"tail\x1b[6");
        assert_eq!(filtered.output, b"tail".to_vec());
        assert_eq!(filter.finish(), b"\x1b[6".to_vec());
    }
}
