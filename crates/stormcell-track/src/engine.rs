//! The temporal tracking engine.
//!
//! Matches the clusters of one time step against those of the previous
//! step, carries identities forward, hands out fresh ones, and annotates
//! merges and splits. All results land on the current [`ClusterList`]; the
//! previous list is read-only.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::{debug, info, trace};

use stormcell_core::math::vector_sub;
use stormcell_core::{CoordinateSystem, CoreError, CoreResult};
use stormcell_cluster::{Cluster, ClusterList};

use crate::config::TrackingConfig;
use crate::correlation::CorrelationMatrices;

/// Progress marker of a tracking run, mostly for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingPhase {
    /// Inputs validated.
    Init,
    /// Stale ids erased, uuids handed out.
    Preliminaries,
    /// Pairwise matrices evaluated.
    CorrelationBuilt,
    /// Match likelihoods evaluated.
    ProbabilitiesComputed,
    /// Greedy matchmaking finished.
    Matched,
    /// Merges and splits annotated, late id donations applied.
    MergeSplitResolved,
    /// All annotations written to the current list.
    Finalized,
    /// Nothing to track (the current list is empty).
    Skipped,
}

/// Outcome of one tracking run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSummary {
    /// Phase the run ended in: [`TrackingPhase::Finalized`] or
    /// [`TrackingPhase::Skipped`].
    pub phase: TrackingPhase,
    /// Time difference between the lists, seconds.
    pub delta_t: i64,
    /// Number of ids carried over from the previous step.
    pub tracked: usize,
    /// Number of fresh ids handed out.
    pub new: usize,
    /// Number of previous-step ids without continuation.
    pub dropped: usize,
    /// Number of merge events annotated.
    pub merges: usize,
    /// Number of split events annotated.
    pub splits: usize,
}

/// The tracking engine. Holds the configuration; one instance serves any
/// number of runs.
pub struct Tracking {
    config: TrackingConfig,
}

impl Tracking {
    /// Create an engine with the given configuration.
    pub fn new(config: TrackingConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine with the default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: TrackingConfig::default(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Track `current` against `previous`.
    ///
    /// On success the current list carries the full set of annotations:
    /// inherited or fresh ids on every cluster, displacement vectors on
    /// matched clusters, and the tracked/new/dropped id sets plus merge and
    /// split maps. On error the current list is left untouched.
    pub fn track(
        &self,
        previous: &ClusterList,
        current: &mut ClusterList,
        cs: &dyn CoordinateSystem,
        tracking_variable: Option<&str>,
    ) -> CoreResult<TrackingSummary> {
        let mut phase = TrackingPhase::Init;
        let delta_t = current.timestamp - previous.timestamp;
        trace!(?phase, delta_t, "tracking run");

        if current.is_empty() {
            phase = TrackingPhase::Skipped;
            info!(delta_t, "current list is empty, nothing to track");
            current.highest_id = highest_live_id(previous);
            current.highest_uuid = highest_live_uuid(previous);
            current.dropped_ids = previous
                .clusters
                .iter()
                .filter_map(|c| c.id)
                .collect();
            current.tracking_performed = true;
            return Ok(TrackingSummary {
                phase,
                delta_t,
                tracked: 0,
                new: 0,
                dropped: current.dropped_ids.len(),
                merges: 0,
                splits: 0,
            });
        }

        if previous.spatial_variables != current.spatial_variables
            || previous.value_variables != current.value_variables
        {
            return Err(CoreError::configuration(
                "cluster lists disagree on feature variables",
            ));
        }
        let tracking_value_index = match tracking_variable {
            Some(name) => Some(
                current
                    .value_variables
                    .iter()
                    .position(|v| v == name)
                    .ok_or_else(|| {
                        CoreError::configuration(format!(
                            "tracking variable {name:?} not among value variables"
                        ))
                    })?,
            ),
            None => None,
        };
        if delta_t <= 0 || delta_t > self.config.max_delta_t_secs {
            return Err(CoreError::temporal_order(
                delta_t,
                self.config.max_delta_t_secs,
            ));
        }

        // preliminaries: no stale identities may survive into matchmaking
        phase = TrackingPhase::Preliminaries;
        current.erase_identifiers();
        current.highest_uuid = highest_live_uuid(previous);
        current.assign_uuids();
        current.highest_id = highest_live_id(previous);
        current.tracked_ids.clear();
        current.new_ids.clear();
        current.dropped_ids.clear();
        current.merges.clear();
        current.splits.clear();
        debug!(?phase, delta_t, "preliminaries done");

        phase = TrackingPhase::CorrelationBuilt;
        let matrices = CorrelationMatrices::compute(
            previous,
            current,
            cs,
            &self.config,
            delta_t,
            tracking_value_index,
        );
        trace!(?phase, "correlation matrices ready");

        phase = TrackingPhase::ProbabilitiesComputed;
        let n_current = current.size();
        let m_previous = previous.size();
        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for n in 0..n_current {
            for m in 0..m_previous {
                if previous.clusters[m].id.is_none() {
                    continue;
                }
                let l = matrices.likelihood(n, m, &self.config);
                if l.is_finite() {
                    candidates.push((n, m, l));
                }
            }
        }
        // stable sort: equal likelihoods resolve by enumeration order
        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));
        debug!(?phase, candidates = candidates.len(), "likelihoods computed");

        phase = TrackingPhase::Matched;
        let mut match_of_current: Vec<Option<usize>> = vec![None; n_current];
        let mut match_of_previous: Vec<Option<usize>> = vec![None; m_previous];
        for &(n, m, likelihood) in &candidates {
            if match_of_current[n].is_some() || match_of_previous[m].is_some() {
                continue;
            }
            match_of_current[n] = Some(m);
            match_of_previous[m] = Some(n);
            let id = previous.clusters[m].id;
            current.clusters[n].id = id;
            current.clusters[n].displacement =
                displacement(&current.clusters[n], &previous.clusters[m], cs);
            if let Some(id) = id {
                current.tracked_ids.insert(id);
                trace!(n, m, id, likelihood, "matched");
            }
        }

        // fresh ids for everything unmatched
        for (n, slot) in match_of_current.iter().enumerate() {
            if slot.is_none() {
                let id = current.highest_id.map_or(0, |h| h + 1);
                current.highest_id = Some(id);
                current.clusters[n].id = Some(id);
                current.new_ids.insert(id);
                trace!(n, id, "new cluster");
            }
        }
        for (m, slot) in match_of_previous.iter().enumerate() {
            if slot.is_none() {
                if let Some(id) = previous.clusters[m].id {
                    current.dropped_ids.insert(id);
                }
            }
        }
        debug!(
            ?phase,
            tracked = current.tracked_ids.len(),
            new = current.new_ids.len(),
            dropped = current.dropped_ids.len(),
            "matchmaking done"
        );

        self.resolve_merges(previous, current, &matrices, &match_of_current);
        self.resolve_splits(previous, current, &matrices, &match_of_previous);
        phase = TrackingPhase::MergeSplitResolved;
        debug!(
            ?phase,
            merges = current.merges.len(),
            splits = current.splits.len(),
            "merge/split resolution done"
        );

        phase = TrackingPhase::Finalized;
        for c in &mut current.clusters {
            c.refresh_point_backrefs();
        }
        current.tracking_performed = true;

        let summary = TrackingSummary {
            phase,
            delta_t,
            tracked: current.tracked_ids.len(),
            new: current.new_ids.len(),
            dropped: current.dropped_ids.len(),
            merges: current.merges.len(),
            splits: current.splits.len(),
        };
        info!(
            delta_t,
            tracked = summary.tracked,
            new = summary.new,
            dropped = summary.dropped,
            merges = summary.merges,
            splits = summary.splits,
            "tracking complete"
        );
        Ok(summary)
    }

    /// Annotate current clusters that absorbed several predecessors.
    ///
    /// A predecessor contributes to current cluster `n` if it is `n`'s
    /// matched partner, or if it went unmatched, is significantly covered
    /// by `n`, and no other current cluster scores at least as well for it.
    /// A current cluster carrying a fresh id inherits the id of its
    /// strongest contributor, provided that contributor wins outright;
    /// equal top scores leave the fresh id in place.
    fn resolve_merges(
        &self,
        previous: &ClusterList,
        current: &mut ClusterList,
        matrices: &CorrelationMatrices,
        match_of_current: &[Option<usize>],
    ) {
        let n_current = current.size();
        let m_previous = previous.size();
        let matched_previous: Vec<bool> = {
            let mut v = vec![false; m_previous];
            for slot in match_of_current.iter().flatten() {
                v[*slot] = true;
            }
            v
        };

        for n in 0..n_current {
            let mut contributors: Vec<usize> = Vec::new();
            for m in 0..m_previous {
                if previous.clusters[m].id.is_none() {
                    continue;
                }
                if match_of_current[n] == Some(m) {
                    contributors.push(m);
                    continue;
                }
                if matched_previous[m] {
                    continue;
                }
                if matrices.cover_old_by_new[[n, m]] < self.config.merge_split_threshold {
                    continue;
                }
                let score = matrices.merge_score(n, m);
                let best_elsewhere = (0..n_current)
                    .filter(|&other| other != n)
                    .map(|other| matrices.merge_score(other, m))
                    .fold(f64::NEG_INFINITY, f64::max);
                if score >= best_elsewhere {
                    contributors.push(m);
                }
            }
            if contributors.len() < 2 {
                continue;
            }

            let mut final_id = current.clusters[n].id;
            if final_id.map_or(false, |id| current.new_ids.contains(&id)) {
                if let Some(winner) = strict_best(&contributors, |m| matrices.merge_score(n, m)) {
                    let donated = previous.clusters[winner].id;
                    if let (Some(fresh), Some(donated)) = (final_id, donated) {
                        trace!(n, fresh, donated, "merge donates id to fresh cluster");
                        current.new_ids.remove(&fresh);
                        current.tracked_ids.insert(donated);
                        current.dropped_ids.remove(&donated);
                        // id donation is not a track continuation; the
                        // displacement stays unset
                        current.clusters[n].id = Some(donated);
                        final_id = Some(donated);
                    }
                }
            }

            if let Some(id) = final_id {
                let sources: BTreeSet<u64> = contributors
                    .iter()
                    .filter_map(|&m| previous.clusters[m].id)
                    .collect();
                current.merges.insert(id, sources);
            }
        }
    }

    /// Annotate predecessors that broke apart into several current
    /// clusters. Mirror image of [`Self::resolve_merges`].
    fn resolve_splits(
        &self,
        previous: &ClusterList,
        current: &mut ClusterList,
        matrices: &CorrelationMatrices,
        match_of_previous: &[Option<usize>],
    ) {
        let n_current = current.size();
        let m_previous = previous.size();

        for m in 0..m_previous {
            let Some(previous_id) = previous.clusters[m].id else {
                continue;
            };
            let mut fragments: Vec<usize> = Vec::new();
            for n in 0..n_current {
                if match_of_previous[m] == Some(n) {
                    fragments.push(n);
                    continue;
                }
                let is_fresh = current.clusters[n]
                    .id
                    .map_or(false, |id| current.new_ids.contains(&id));
                if !is_fresh {
                    continue;
                }
                if matrices.cover_new_by_old[[n, m]] < self.config.merge_split_threshold {
                    continue;
                }
                let score = matrices.split_score(n, m);
                let best_elsewhere = (0..m_previous)
                    .filter(|&other| other != m)
                    .map(|other| matrices.split_score(n, other))
                    .fold(f64::NEG_INFINITY, f64::max);
                if score >= best_elsewhere {
                    fragments.push(n);
                }
            }
            if fragments.len() < 2 {
                continue;
            }

            if match_of_previous[m].is_none() {
                // the id went dropped; the strongest fragment inherits it
                // if it wins outright
                if let Some(winner) = strict_best(&fragments, |n| matrices.split_score(n, m)) {
                    if let Some(fresh) = current.clusters[winner].id {
                        if current.new_ids.remove(&fresh) {
                            trace!(
                                m,
                                fresh,
                                previous_id,
                                "split donates id to strongest fragment"
                            );
                            current.tracked_ids.insert(previous_id);
                            current.dropped_ids.remove(&previous_id);
                            current.clusters[winner].id = Some(previous_id);
                        }
                    }
                }
            }

            let parts: BTreeSet<u64> = fragments
                .iter()
                .filter_map(|&n| current.clusters[n].id)
                .collect();
            current.splits.insert(previous_id, parts);
        }
    }
}

/// Highest id in use on `list`: the cached watermark, or a scan over the
/// live clusters when the cache is unset. Without the scan a fresh id
/// could collide with an id still alive on the previous step.
fn highest_live_id(list: &ClusterList) -> Option<u64> {
    list.highest_id
        .or_else(|| list.clusters.iter().filter_map(|c| c.id).max())
}

/// Uuid counterpart of [`highest_live_id`].
fn highest_live_uuid(list: &ClusterList) -> Option<u64> {
    list.highest_uuid
        .or_else(|| list.clusters.iter().filter_map(|c| c.uuid).max())
}

/// Physical displacement between the centers of a current cluster and its
/// predecessor. Empty when either center is undefined.
fn displacement(current: &Cluster, previous: &Cluster, cs: &dyn CoordinateSystem) -> Vec<f64> {
    match (current.geometrical_center(), previous.geometrical_center()) {
        (Some(c), Some(p)) => cs.to_physical_units(&vector_sub(&c, &p)),
        _ => Vec::new(),
    }
}

/// Position with the strictly highest score, or `None` when the top score
/// is shared.
fn strict_best<F>(positions: &[usize], score: F) -> Option<usize>
where
    F: Fn(usize) -> f64,
{
    let mut best: Option<(usize, f64)> = None;
    let mut tied = false;
    for &p in positions {
        let s = score(p);
        match best {
            None => best = Some((p, s)),
            Some((_, b)) if s > b => {
                best = Some((p, s));
                tied = false;
            }
            Some((_, b)) if s == b => tied = true,
            _ => {}
        }
    }
    match best {
        Some((p, _)) if !tied => Some(p),
        _ => None,
    }
}
