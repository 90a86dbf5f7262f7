//! Per-URL resolution state.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use url::Url;

/// What is known about an absolute module URL. Absence from the table
/// means "unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    /// A fetch failed or returned a non-success status.
    Bad,
    /// Resolution continues at another URL.
    Redirected(Url),
    /// Types live in a local declaration file.
    Typed(PathBuf),
    /// Executable module with no local types.
    Runtime,
}

/// Counters reported by [`super::ModuleResolver::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStats {
    pub bad: usize,
    pub redirected: usize,
    pub typed: usize,
    pub runtime: usize,
    pub in_flight: usize,
    /// Background tasks started since the resolver was created.
    pub started: u64,
    pub generation: u64,
}

/// Known states plus the set of URLs with a background task running.
///
/// States only move out of "unknown"; [`reset`](Self::reset) is the only way
/// back. Every reset bumps the generation so that tasks started before it
/// cannot write into the fresh table.
#[derive(Debug, Default)]
pub struct StateTable {
    states: HashMap<Url, ModuleState>,
    in_flight: HashSet<Url>,
    generation: u64,
    started: u64,
}

impl StateTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, url: &Url) -> Option<&ModuleState> {
        self.states.get(url)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record `state` for an unknown `url`.
    ///
    /// Returns `false` if the URL is already classified or `generation` is
    /// stale. A redirect that would close a cycle is stored as
    /// [`ModuleState::Bad`].
    pub fn transition(&mut self, generation: u64, url: &Url, state: ModuleState) -> bool {
        if generation != self.generation || self.states.contains_key(url) {
            return false;
        }
        let state = match state {
            ModuleState::Redirected(target) if self.closes_loop(url, &target) => ModuleState::Bad,
            other => other,
        };
        self.states.insert(url.clone(), state);
        true
    }

    /// Mark `url` as in flight.
    ///
    /// Returns the current generation, or `None` when the URL is already
    /// classified or another task owns it.
    pub fn begin(&mut self, url: &Url) -> Option<u64> {
        if self.states.contains_key(url) || !self.in_flight.insert(url.clone()) {
            return None;
        }
        self.started += 1;
        Some(self.generation)
    }

    /// Clear the in-flight marker set by [`begin`](Self::begin).
    ///
    /// Returns whether `generation` is still current.
    pub fn finish(&mut self, generation: u64, url: &Url) -> bool {
        if generation != self.generation {
            return false;
        }
        self.in_flight.remove(url);
        true
    }

    #[must_use]
    pub fn is_in_flight(&self, url: &Url) -> bool {
        self.in_flight.contains(url)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget everything. Tasks still running become no-ops.
    pub fn reset(&mut self) {
        self.states.clear();
        self.in_flight.clear();
        self.generation += 1;
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        let mut stats = ResolverStats {
            in_flight: self.in_flight.len(),
            started: self.started,
            generation: self.generation,
            ..ResolverStats::default()
        };
        for state in self.states.values() {
            match state {
                ModuleState::Bad => stats.bad += 1,
                ModuleState::Redirected(_) => stats.redirected += 1,
                ModuleState::Typed(_) => stats.typed += 1,
                ModuleState::Runtime => stats.runtime += 1,
            }
        }
        stats
    }

    fn closes_loop(&self, from: &Url, target: &Url) -> bool {
        let mut current = target;
        for _ in 0..=self.states.len() {
            if current == from {
                return true;
            }
            match self.states.get(current) {
                Some(ModuleState::Redirected(next)) => current = next,
                _ => return false,
            }
        }
        true
    }
}
