//! Splitting encoded messages into `?OTR|` fragments and joining them back.
//!
//! A fragment is `?OTR|<id>|<sender>|<receiver>,<index>,<total>,<piece>,`
//! with the three tags as eight hex digits and the counters as five decimal
//! digits, indices starting at 1.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const FRAGMENT_PREFIX: &str = "?OTR|";

/// Bytes a fragment adds around its piece.
pub const FRAGMENT_HEADER_BYTES: usize = 45;

/// Reassembly sets kept at once before new ones are refused.
pub const MAX_PENDING_SETS: usize = 256;

pub fn is_fragment(message: &str) -> bool {
    message.starts_with(FRAGMENT_PREFIX)
}

/// Splits `message` into fragments of at most `max_size` bytes each.
///
/// Every fragment is produced even when the message would fit unsplit; callers
/// decide whether fragmenting is needed at all.
pub fn fragment_message(
    max_size: usize,
    our_tag: u32,
    their_tag: u32,
    message: &str,
) -> Result<Vec<String>> {
    if message.is_empty() {
        return Err(Error::malformed("cannot fragment an empty message"));
    }
    if message.contains(',') {
        return Err(Error::malformed("fragment payload may not contain ','"));
    }
    let limit = max_size.saturating_sub(FRAGMENT_HEADER_BYTES);
    if limit == 0 {
        return Err(Error::Resource(format!(
            "fragment size {max_size} leaves no room for payload"
        )));
    }

    let pieces = split_pieces(message, limit);
    let total = u16::try_from(pieces.len())
        .map_err(|_| Error::Resource(format!("{} fragments needed", pieces.len())))?;
    let identifier: u32 = rand::random();
    debug!(identifier, total, max_size, "fragmenting message");

    Ok(pieces
        .iter()
        .zip(1u16..)
        .map(|(piece, index)| {
            format!(
                "{FRAGMENT_PREFIX}{identifier:08x}|{our_tag:08x}|{their_tag:08x},{index:05},{total:05},{piece},"
            )
        })
        .collect())
}

/// Cuts at most `limit` bytes per piece, never inside a UTF-8 sequence.
fn split_pieces(message: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::with_capacity(message.len().div_ceil(limit));
    let mut rest = message;
    while !rest.is_empty() {
        let mut end = limit.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // A single character wider than the limit.
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (piece, tail) = rest.split_at(end);
        pieces.push(piece);
        rest = tail;
    }
    pieces
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FragmentHeader<'a> {
    identifier: u32,
    sender_tag: u32,
    receiver_tag: u32,
    index: u16,
    total: u16,
    piece: &'a str,
}

fn parse_fragment(message: &str) -> Result<FragmentHeader<'_>> {
    let bad = || Error::malformed("malformed fragment header");
    let rest = message.strip_prefix(FRAGMENT_PREFIX).ok_or_else(bad)?;
    let (tags, rest) = rest.split_once(',').ok_or_else(bad)?;
    let mut tags = tags.split('|').map(|t| u32::from_str_radix(t, 16));
    let (Some(Ok(identifier)), Some(Ok(sender_tag)), Some(Ok(receiver_tag)), None) =
        (tags.next(), tags.next(), tags.next(), tags.next())
    else {
        return Err(bad());
    };
    let (index, rest) = rest.split_once(',').ok_or_else(bad)?;
    let (total, rest) = rest.split_once(',').ok_or_else(bad)?;
    let (piece, _) = rest.split_once(',').ok_or_else(bad)?;
    if piece.is_empty() {
        return Err(Error::malformed("empty fragment piece"));
    }
    Ok(FragmentHeader {
        identifier,
        sender_tag,
        receiver_tag,
        index: index.parse().map_err(|_| bad())?,
        total: total.parse().map_err(|_| bad())?,
        piece,
    })
}

#[derive(Debug, Default)]
struct FragmentSet {
    total: u16,
    pieces: Vec<Option<String>>,
    received: u16,
    last_received_at: u64,
}

/// Partially received messages of one conversation, keyed by fragment id.
#[derive(Debug, Default)]
pub struct FragmentStore {
    sets: HashMap<u32, FragmentSet>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of incomplete messages held.
    pub fn pending(&self) -> usize {
        self.sets.len()
    }

    /// Feeds one incoming message at time `now` (seconds).
    ///
    /// Returns the message itself when it is not a fragment, the joined
    /// message when this piece completes a set, and `None` otherwise.
    pub fn receive(&mut self, message: &str, our_tag: u32, now: u64) -> Result<Option<String>> {
        if !is_fragment(message) {
            return Ok(Some(message.to_owned()));
        }
        let frag = parse_fragment(message)?;
        if frag.receiver_tag != 0 && frag.receiver_tag != our_tag {
            debug!(
                receiver_tag = frag.receiver_tag,
                our_tag, "fragment for another instance ignored"
            );
            return Ok(None);
        }

        if !self.sets.contains_key(&frag.identifier) && self.sets.len() >= MAX_PENDING_SETS {
            warn!(pending = self.sets.len(), "too many incomplete fragmented messages");
            return Err(Error::Resource(format!(
                "{MAX_PENDING_SETS} fragmented messages already pending"
            )));
        }
        let set = self.sets.entry(frag.identifier).or_default();

        if frag.index == 0 || frag.total == 0 || frag.index > frag.total {
            debug!(
                identifier = frag.identifier,
                index = frag.index,
                total = frag.total,
                "fragment set reset"
            );
            *set = FragmentSet::default();
            return Ok(None);
        }
        if set.total != 0 && set.total != frag.total {
            return Err(Error::malformed(format!(
                "fragment total changed from {} to {}",
                set.total, frag.total
            )));
        }
        if set.pieces.is_empty() {
            set.total = frag.total;
            set.pieces = vec![None; usize::from(frag.total)];
        }
        let slot = &mut set.pieces[usize::from(frag.index - 1)];
        if slot.is_some() {
            return Err(Error::malformed(format!(
                "duplicate fragment {} of {}",
                frag.index, frag.total
            )));
        }
        *slot = Some(frag.piece.to_owned());
        set.received += 1;
        set.last_received_at = now;

        if set.received < set.total {
            return Ok(None);
        }
        let joined = self
            .sets
            .remove(&frag.identifier)
            .map(|set| set.pieces.into_iter().flatten().collect::<String>());
        debug!(identifier = frag.identifier, sender_tag = frag.sender_tag, "fragments joined");
        Ok(joined)
    }

    /// Drops sets whose latest piece arrived `max_age` seconds or more before
    /// `now`. Returns how many were dropped.
    pub fn expire(&mut self, now: u64, max_age: u64) -> usize {
        let before = self.sets.len();
        self.sets
            .retain(|_, set| now.saturating_sub(set.last_received_at) < max_age);
        let dropped = before - self.sets.len();
        if dropped > 0 {
            debug!(dropped, "expired incomplete fragmented messages");
        }
        dropped
    }
}
