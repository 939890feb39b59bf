//! M3U playlist parser
//!
//! Line-oriented and incremental: lines can be pushed as they arrive from the
//! network. Accepts the conventional `#EXTINF` → URL ordering as well as the
//! reversed URL → `#EXTINF` ordering some panels emit.

use serde::{Deserialize, Serialize};

/// Name given to channels without metadata
pub const UNNAMED_CHANNEL: &str = "Senza nome";

/// Group given to channels without any group information
pub const UNCATEGORIZED_GROUP: &str = "Senza categoria";

/// A single playable entry of a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: String,
    pub tvg_logo: String,
    pub group: String,
    pub url: String,
}

impl ChannelRecord {
    /// A record for a URL that never got any metadata
    pub fn nameless(url: String, last_group: Option<&str>) -> Self {
        Self {
            name: UNNAMED_CHANNEL.to_string(),
            tvg_logo: String::new(),
            group: last_group.unwrap_or(UNCATEGORIZED_GROUP).to_string(),
            url,
        }
    }
}

/// Metadata from an `#EXTINF` line, waiting for its URL
#[derive(Debug, Clone)]
struct ChannelMeta {
    name: String,
    tvg_logo: String,
    group: String,
}

impl ChannelMeta {
    fn into_record(self, url: String) -> ChannelRecord {
        ChannelRecord {
            name: self.name,
            tvg_logo: self.tvg_logo,
            group: self.group,
            url,
        }
    }
}

/// Incremental M3U parser
///
/// Holds at most one pending metadata entry and at most one pending URL.
#[derive(Debug, Default)]
pub struct M3uParser {
    channels: Vec<ChannelRecord>,
    pending_meta: Option<ChannelMeta>,
    pending_url: Option<String>,
    last_group: Option<String>,
}

impl M3uParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (with or without its line terminator)
    pub fn push_line(&mut self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        if let Some(rest) = line.strip_prefix("#EXTGRP") {
            if let Some((_, group)) = rest.split_once(':') {
                let group = group.trim();
                if !group.is_empty() {
                    self.last_group = Some(group.to_string());
                }
            }
            return;
        }

        if line.starts_with("#EXTINF") {
            let meta = self.parse_extinf(line);
            match self.pending_url.take() {
                Some(url) => self.channels.push(meta.into_record(url)),
                None => self.pending_meta = Some(meta),
            }
            return;
        }

        if line.starts_with('#') {
            return;
        }

        let url = line.to_string();
        if let Some(meta) = self.pending_meta.take() {
            self.channels.push(meta.into_record(url));
            return;
        }

        if let Some(previous) = self.pending_url.replace(url) {
            let record = ChannelRecord::nameless(previous, self.last_group.as_deref());
            self.channels.push(record);
        }
    }

    fn parse_extinf(&self, line: &str) -> ChannelMeta {
        let name = display_name(line);
        let tvg_logo = attribute(line, Attribute::Logo).unwrap_or_default();
        let group = attribute(line, Attribute::Group)
            .filter(|g| !g.is_empty())
            .or_else(|| self.last_group.clone())
            .unwrap_or_else(|| UNCATEGORIZED_GROUP.to_string());

        ChannelMeta {
            name: if name.is_empty() {
                UNNAMED_CHANNEL.to_string()
            } else {
                name
            },
            tvg_logo,
            group,
        }
    }

    /// Number of complete records so far
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Records completed so far, in input order
    pub fn channels(&self) -> &[ChannelRecord] {
        &self.channels
    }

    /// End of input: flush a dangling URL and return every record
    pub fn finish(mut self) -> Vec<ChannelRecord> {
        if let Some(url) = self.pending_url.take() {
            let record = ChannelRecord::nameless(url, self.last_group.as_deref());
            self.channels.push(record);
        }
        self.channels
    }
}

/// Parse a complete playlist body
pub fn parse_playlist(text: &str) -> Vec<ChannelRecord> {
    let mut parser = M3uParser::new();
    for line in text.lines() {
        parser.push_line(line);
    }
    parser.finish()
}

#[derive(Debug, Clone, Copy)]
enum Attribute {
    Logo,
    Group,
}

fn attribute(line: &str, attr: Attribute) -> Option<String> {
    let (quoted, bare) = match attr {
        Attribute::Logo => (
            regex!(r#"(?i)tvg-logo="([^"]*)""#),
            regex!(r#"(?i)tvg-logo=([^ ,]+)"#),
        ),
        Attribute::Group => (
            regex!(r#"(?i)group-title="([^"]*)""#),
            regex!(r#"(?i)group-title=([^,]+)"#),
        ),
    };
    quoted
        .captures(line)
        .or_else(|| bare.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Channel name: everything after the first comma outside a quoted value.
fn display_name(line: &str) -> String {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return line[i + 1..].trim().to_string(),
            _ => {}
        }
    }
    String::new()
}
