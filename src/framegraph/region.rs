//! Named spans of passes, forwarded to debug labels and profiler spans.

use tracing::span::EnteredSpan;

use crate::device::CommandRecorder;

use super::{error::GraphError, resource::PassIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    /// First pass inside the region.
    pub begin: PassIndex,
    /// One past the last pass, set when the region is closed.
    pub end: Option<PassIndex>,
}

#[derive(Debug, Default)]
pub(crate) struct Regions {
    regions: Vec<Region>,
    open: Vec<usize>,
}

impl Regions {
    pub fn begin(&mut self, name: impl Into<String>, pass_count: PassIndex) -> RegionId {
        let index = self.regions.len();
        self.regions.push(Region {
            name: name.into(),
            begin: pass_count,
            end: None,
        });
        self.open.push(index);
        RegionId(index)
    }

    /// Closes `id`, which must be the innermost open region.
    pub fn end(&mut self, id: RegionId, pass_count: PassIndex) -> Result<(), GraphError> {
        match self.open.last() {
            Some(&top) if top == id.0 => {
                self.open.pop();
                self.regions[id.0].end = Some(pass_count);
                Ok(())
            }
            _ => Err(GraphError::UnbalancedRegion {
                name: self
                    .regions
                    .get(id.0)
                    .map(|r| r.name.clone())
                    .unwrap_or_default(),
            }),
        }
    }

    /// Closes every region still open when the graph is rendered.
    pub fn finish(mut self, pass_count: PassIndex) -> Vec<Region> {
        for index in self.open.drain(..).rev() {
            log::debug!(
                "region \"{}\" was never closed, ending it after the last pass",
                self.regions[index].name
            );
            self.regions[index].end = Some(pass_count);
        }
        self.regions
    }
}

struct ActiveRegion {
    end: PassIndex,
    _span: EnteredSpan,
}

/// Opens and closes regions as rendering walks through the passes.
pub(crate) struct RegionCursor {
    regions: std::vec::IntoIter<Region>,
    next: Option<Region>,
    active: Vec<ActiveRegion>,
}

impl RegionCursor {
    pub fn new(regions: Vec<Region>) -> Self {
        let mut regions = regions.into_iter();
        let next = regions.next();
        Self {
            regions,
            next,
            active: Vec::new(),
        }
    }

    /// Moves to `pass`: closes the regions ending before it and opens the
    /// ones starting at it.
    pub fn advance(&mut self, pass: PassIndex, recorder: &mut dyn CommandRecorder) {
        self.close_until(pass, recorder);

        while let Some(region) = self.next.take_if(|r| r.begin <= pass) {
            let end = region.end.unwrap_or(region.begin);
            recorder.begin_label(&region.name);
            let span = tracing::info_span!("region", name = %region.name).entered();
            self.active.push(ActiveRegion { end, _span: span });
            self.next = self.regions.next();
            self.close_until(pass, recorder);
        }
    }

    fn close_until(&mut self, pass: PassIndex, recorder: &mut dyn CommandRecorder) {
        while self.active.last().is_some_and(|r| r.end <= pass) {
            self.active.pop();
            recorder.end_label();
        }
    }

    /// Closes every region still active after the last pass.
    pub fn finish(mut self, recorder: &mut dyn CommandRecorder) {
        while self.active.pop().is_some() {
            recorder.end_label();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::null::{RecordedCommand, RecordingCommands};

    #[test]
    fn test_regions_must_close_innermost_first() {
        let mut regions = Regions::default();
        let outer = regions.begin("frame", 0);
        let inner = regions.begin("shadows", 0);

        assert!(regions.end(outer, 1).is_err());
        regions.end(inner, 1).unwrap();
        regions.end(outer, 2).unwrap();
    }

    #[test]
    fn test_unclosed_regions_end_at_last_pass() {
        let mut regions = Regions::default();
        regions.begin("frame", 0);
        let regions = regions.finish(3);
        assert_eq!(regions[0].end, Some(3));
    }

    #[test]
    fn test_cursor_nests_labels() {
        let mut regions = Regions::default();
        let outer = regions.begin("frame", 0);
        let inner = regions.begin("shadows", 0);
        regions.end(inner, 1).unwrap();
        regions.end(outer, 2).unwrap();
        let empty = regions.begin("empty", 2);
        regions.end(empty, 2).unwrap();

        let mut recorder = RecordingCommands::new();
        let mut cursor = RegionCursor::new(regions.finish(2));
        for pass in 0..2 {
            cursor.advance(pass, &mut recorder);
            recorder.insert_label(&format!("pass{pass}"));
        }
        cursor.advance(2, &mut recorder);
        cursor.finish(&mut recorder);

        use RecordedCommand::*;
        assert_eq!(
            recorder.commands(),
            &[
                BeginLabel("frame".into()),
                BeginLabel("shadows".into()),
                Label("pass0".into()),
                EndLabel,
                Label("pass1".into()),
                EndLabel,
                BeginLabel("empty".into()),
                EndLabel,
            ]
        );
    }
}
