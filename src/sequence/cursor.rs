use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use super::{EventSequence, SequenceSource};
use crate::events::SequenceEvent;
use crate::{Error, Result};

/// Position inside a round-robin playlist of sequences.
pub struct Cursor {
    playlist: Vec<Arc<EventSequence>>,
    index: usize,
    position: usize,
}

impl Cursor {
    fn current(&self) -> &EventSequence {
        &self.playlist[self.index]
    }

    fn step(&mut self) -> Option<SequenceEvent> {
        let event = self.playlist[self.index].events.get(self.position).cloned()?;
        self.position += 1;
        Some(event)
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % self.playlist.len();
        self.position = 0;
        debug!(sequence = %self.current().name, "advancing playlist");
    }

    /// Never fails: an exhausted sequence moves the cursor to the start of the
    /// next playlist entry.
    pub fn next_event(&mut self) -> SequenceEvent {
        loop {
            if let Some(event) = self.step() {
                return event;
            }
            self.advance();
        }
    }

    /// Consumes events of the current sequence up to and including the release
    /// of `pitch` on `channel`, returning the ticks that elapsed. Returns `None`
    /// when the sequence ends first.
    pub fn scan_release(&mut self, channel: u8, pitch: u8) -> Option<u64> {
        let mut elapsed = 0u64;
        while let Some(event) = self.step() {
            elapsed += event.delta_ticks as u64;
            if event.releases(channel, pitch) {
                return Some(elapsed);
            }
        }
        None
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.current().ticks_per_beat
    }

    pub fn sequence_name(&self) -> &str {
        &self.current().name
    }

    pub fn playlist_index(&self) -> usize {
        self.index
    }

    /// Number of events in one full pass over the playlist.
    pub fn cycle_len(&self) -> usize {
        self.playlist.iter().map(|s| s.len()).sum()
    }
}

/// The single shared cursor. Every pull from every thread goes through the
/// same lock, so no event is ever handed out twice.
pub struct SequenceCursor {
    cursor: Mutex<Cursor>,
}

impl SequenceCursor {
    pub fn new(playlist: Vec<EventSequence>) -> Result<Self> {
        if playlist.iter().all(|s| s.is_empty()) {
            return Err(Error::EmptyPlaylist);
        }
        Ok(Self {
            cursor: Mutex::new(Cursor {
                playlist: playlist.into_iter().map(Arc::new).collect(),
                index: 0,
                position: 0,
            }),
        })
    }

    pub fn load<S: SequenceSource + ?Sized>(source: &S, ids: &[String]) -> Result<Self> {
        let playlist = ids
            .iter()
            .map(|id| source.load(id))
            .collect::<Result<Vec<_>>>()?;
        Self::new(playlist)
    }

    pub fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock()
    }

    pub fn next_event(&self) -> SequenceEvent {
        self.lock().next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::MemorySource;
    use std::collections::HashSet;
    use std::thread;

    fn seq(name: &str, pitches: &[u8]) -> EventSequence {
        let events = pitches
            .iter()
            .map(|p| SequenceEvent::note_on(0, *p, 100))
            .collect();
        EventSequence::new(name, 480, events)
    }

    fn pitch(event: &SequenceEvent) -> u8 {
        event.struck().map(|(p, _)| p).unwrap()
    }

    #[test]
    fn wraps_round_robin() {
        let cursor = SequenceCursor::new(vec![seq("a", &[1, 2]), seq("b", &[3])]).unwrap();
        let pulled: Vec<u8> = (0..7).map(|_| pitch(&cursor.next_event())).collect();
        assert_eq!(pulled, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn skips_empty_sequences() {
        let cursor =
            SequenceCursor::new(vec![seq("a", &[1]), seq("empty", &[]), seq("c", &[2])]).unwrap();
        let pulled: Vec<u8> = (0..4).map(|_| pitch(&cursor.next_event())).collect();
        assert_eq!(pulled, vec![1, 2, 1, 2]);
    }

    #[test]
    fn rejects_playlist_without_events() {
        assert!(matches!(
            SequenceCursor::new(vec![seq("empty", &[])]),
            Err(Error::EmptyPlaylist)
        ));
        assert!(matches!(SequenceCursor::new(vec![]), Err(Error::EmptyPlaylist)));
    }

    #[test]
    fn load_fails_on_missing_entry() {
        let source = MemorySource::new().with(seq("a", &[1]));
        let ids = vec!["a".to_string(), "missing".to_string()];
        assert!(matches!(
            SequenceCursor::load(&source, &ids),
            Err(Error::SequenceLoad { .. })
        ));
    }

    #[test]
    fn scan_consumes_through_release() {
        let events = vec![
            SequenceEvent::note_on(0, 60, 100),
            SequenceEvent::note_on(0, 62, 100).after(10, Default::default()),
            SequenceEvent::note_on(0, 60, 0).after(20, Default::default()),
            SequenceEvent::note_off(0, 62).after(30, Default::default()),
        ];
        let cursor = SequenceCursor::new(vec![EventSequence::new("s", 96, events)]).unwrap();
        let mut guard = cursor.lock();
        assert_eq!(guard.next_event().struck(), Some((60, 100)));
        assert_eq!(guard.scan_release(0, 60), Some(30));
        assert_eq!(guard.next_event().released(), Some(62));
    }

    #[test]
    fn scan_stops_at_sequence_end() {
        let cursor = SequenceCursor::new(vec![seq("a", &[1, 2]), seq("b", &[3])]).unwrap();
        let mut guard = cursor.lock();
        guard.next_event();
        assert_eq!(guard.scan_release(0, 1), None);
        assert_eq!(guard.playlist_index(), 0);
        assert_eq!(pitch(&guard.next_event()), 3);
        assert_eq!(guard.sequence_name(), "b");
    }

    #[test]
    fn concurrent_pulls_never_duplicate() {
        let pitches: Vec<u8> = (0..100).collect();
        let cursor = std::sync::Arc::new(SequenceCursor::new(vec![seq("a", &pitches)]).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cursor = cursor.clone();
                thread::spawn(move || (0..25).map(|_| pitch(&cursor.next_event())).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for p in handle.join().unwrap() {
                assert!(seen.insert(p), "pitch {p} pulled twice");
            }
        }
        assert_eq!(seen.len(), 100);
    }
}
