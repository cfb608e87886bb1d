//! # Analysis Memory Arena
//!
//! One contiguous `f32` allocation sliced into fixed, named regions. Every
//! buffer the analysis stages touch lives here, so a running pipeline never
//! allocates and every buffer keeps the same address for the whole session.
//!
//! Regions are plain `{offset, len}` index pairs; access goes through
//! bounds-checked slices. [`Arena::views_mut`] hands out all regions at once
//! as disjoint mutable slices so stages can read one region while writing
//! another.

use crate::config::AnalyzerConfig;

/// Names of the arena regions, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    /// Raw samples of the current analysis window.
    Frame,
    /// Windowed samples fed to the transform.
    Windowed,
    SpectrumRe,
    SpectrumIm,
    MagnitudeDb,
    FloorCurrent,
    FloorPrevious,
    FloorScratch,
    /// Published noise floor (fit plus threshold offset).
    NoiseFloorDb,
    DenoisedDb,
    Hps,
    DisplayCurrent,
    DisplayTarget,
}

impl RegionId {
    pub const ALL: [RegionId; 13] = [
        RegionId::Frame,
        RegionId::Windowed,
        RegionId::SpectrumRe,
        RegionId::SpectrumIm,
        RegionId::MagnitudeDb,
        RegionId::FloorCurrent,
        RegionId::FloorPrevious,
        RegionId::FloorScratch,
        RegionId::NoiseFloorDb,
        RegionId::DenoisedDb,
        RegionId::Hps,
        RegionId::DisplayCurrent,
        RegionId::DisplayTarget,
    ];
}

/// Element count of every region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLayout {
    pub frame: usize,
    pub windowed: usize,
    pub spectrum_re: usize,
    pub spectrum_im: usize,
    pub magnitude_db: usize,
    pub floor_current: usize,
    pub floor_previous: usize,
    pub floor_scratch: usize,
    pub noise_floor_db: usize,
    pub denoised_db: usize,
    pub hps: usize,
    pub display_current: usize,
    pub display_target: usize,
}

impl ArenaLayout {
    /// Layout needed by a pipeline running `config`.
    pub fn for_config(config: &AnalyzerConfig) -> Self {
        let n = config.fft_size;
        let half = config.half_size();
        Self {
            frame: n,
            windowed: n,
            spectrum_re: half,
            spectrum_im: half,
            magnitude_db: half,
            floor_current: half,
            floor_previous: half,
            floor_scratch: half,
            noise_floor_db: half,
            denoised_db: half,
            hps: config.hps_len(),
            display_current: half,
            display_target: half,
        }
    }

    pub fn len_of(&self, id: RegionId) -> usize {
        match id {
            RegionId::Frame => self.frame,
            RegionId::Windowed => self.windowed,
            RegionId::SpectrumRe => self.spectrum_re,
            RegionId::SpectrumIm => self.spectrum_im,
            RegionId::MagnitudeDb => self.magnitude_db,
            RegionId::FloorCurrent => self.floor_current,
            RegionId::FloorPrevious => self.floor_previous,
            RegionId::FloorScratch => self.floor_scratch,
            RegionId::NoiseFloorDb => self.noise_floor_db,
            RegionId::DenoisedDb => self.denoised_db,
            RegionId::Hps => self.hps,
            RegionId::DisplayCurrent => self.display_current,
            RegionId::DisplayTarget => self.display_target,
        }
    }

    /// Sum of all region lengths.
    pub fn total(&self) -> usize {
        RegionId::ALL.iter().map(|&id| self.len_of(id)).sum()
    }
}

/// A non-owning `{offset, len}` view into the arena's backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// All regions borrowed mutably at the same time.
#[derive(Debug)]
pub struct ArenaViews<'a> {
    pub frame: &'a mut [f32],
    pub windowed: &'a mut [f32],
    pub spectrum_re: &'a mut [f32],
    pub spectrum_im: &'a mut [f32],
    pub magnitude_db: &'a mut [f32],
    pub floor_current: &'a mut [f32],
    pub floor_previous: &'a mut [f32],
    pub floor_scratch: &'a mut [f32],
    pub noise_floor_db: &'a mut [f32],
    pub denoised_db: &'a mut [f32],
    pub hps: &'a mut [f32],
    pub display_current: &'a mut [f32],
    pub display_target: &'a mut [f32],
}

/// Owner of the single backing allocation.
#[derive(Debug)]
pub struct Arena {
    layout: ArenaLayout,
    regions: [Region; 13],
    storage: Vec<f32>,
}

impl Arena {
    pub fn new(layout: ArenaLayout) -> Self {
        let total = layout.total();
        let mut regions = [Region { offset: 0, len: 0 }; 13];
        let mut offset = 0;
        for (slot, &id) in regions.iter_mut().zip(RegionId::ALL.iter()) {
            let len = layout.len_of(id);
            *slot = Region { offset, len };
            offset += len;
        }
        assert_eq!(offset, total, "arena regions must tile the allocation exactly");

        log::debug!("Allocating analysis arena: {} regions, {} floats", regions.len(), total);
        Self {
            layout,
            regions,
            storage: vec![0.0; total],
        }
    }

    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    /// Total number of `f32` elements in the backing store.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn region_info(&self, id: RegionId) -> Region {
        self.regions[id as usize]
    }

    pub fn region(&self, id: RegionId) -> &[f32] {
        &self.storage[self.region_info(id).range()]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut [f32] {
        let range = self.region_info(id).range();
        &mut self.storage[range]
    }

    /// Zeroes every region.
    pub fn clear(&mut self) {
        self.storage.fill(0.0);
    }

    /// Splits the store into every region at once.
    pub fn views_mut(&mut self) -> ArenaViews<'_> {
        let layout = self.layout;
        let mut rest: &mut [f32] = &mut self.storage;
        ArenaViews {
            frame: carve(&mut rest, layout.frame),
            windowed: carve(&mut rest, layout.windowed),
            spectrum_re: carve(&mut rest, layout.spectrum_re),
            spectrum_im: carve(&mut rest, layout.spectrum_im),
            magnitude_db: carve(&mut rest, layout.magnitude_db),
            floor_current: carve(&mut rest, layout.floor_current),
            floor_previous: carve(&mut rest, layout.floor_previous),
            floor_scratch: carve(&mut rest, layout.floor_scratch),
            noise_floor_db: carve(&mut rest, layout.noise_floor_db),
            denoised_db: carve(&mut rest, layout.denoised_db),
            hps: carve(&mut rest, layout.hps),
            display_current: carve(&mut rest, layout.display_current),
            display_target: carve(&mut rest, layout.display_target),
        }
    }
}

fn carve<'a>(rest: &mut &'a mut [f32], len: usize) -> &'a mut [f32] {
    let (head, tail) = std::mem::take(rest).split_at_mut(len);
    *rest = tail;
    head
}
