//! The attribute index: the central dictionary from predicates to features.

use std::io::{BufRead, Write};

use hashbrown::HashMap;

use crate::common::{TagPair, NONE};
use crate::errors::{LegatoError, Result};
use crate::features::{self, NUM_TYPES, TYPE_TRANS};
use crate::io;

/// Marker for a feature that owns no weight slot (pruned by a cutoff).
pub(crate) const NO_SLOT: u32 = u32::MAX;

/// One active `(predicate, prev-label, curr-label)` triple.
///
/// A feature whose `pair.prev` is [`NONE`] is a state feature and depends
/// only on the current label; any other `prev` makes it a transition feature.
pub struct Feature {
    /// The label pair this feature fires on.
    pub pair: TagPair,
    /// Training count; `0` marks a feature pruned by a cutoff, which keeps
    /// its place structurally but never contributes again.
    pub freq: u64,
    /// Index of this feature's weight in the flat weight vector, or
    /// [`NO_SLOT`] when pruned.
    pub slot: u32,
    /// Model-expectation accumulator filled during each gradient pass.
    pub expectation: f64,
}

struct AttrEntry {
    ty: u16,
    value: String,
    freq: u64,
    features: Vec<Feature>,
}

impl AttrEntry {
    fn increment(&mut self, pair: TagPair) {
        self.freq += 1;
        for feature in &mut self.features {
            if feature.pair == pair {
                feature.freq += 1;
                return;
            }
        }
        self.features.push(Feature {
            pair,
            freq: 1,
            slot: NO_SLOT,
            expectation: 0.0,
        });
    }

    fn cutoff(&mut self, freq: u64) {
        for feature in &mut self.features {
            if feature.freq < freq {
                self.freq -= feature.freq;
                feature.freq = 0;
            }
        }
    }

    fn num_active(&self) -> u64 {
        self.features.iter().filter(|f| f.freq > 0).count() as u64
    }
}

/// Reference to a feature: the attribute entry id and the position of the
/// feature within the entry. Stable once the index has been compacted.
pub(crate) type FeatRef = (u32, u32);

/// The feature activations at one position of one sentence: the gold label
/// pair and the features whose predicates fired there.
pub struct Context {
    /// Observed `(prev, curr)` label pair; meaningless at tag time.
    pub pair: TagPair,
    features: Vec<FeatRef>,
}

impl Context {
    pub(crate) fn new(pair: TagPair) -> Self {
        Self {
            pair,
            features: vec![],
        }
    }

    pub(crate) fn features(&self) -> &[FeatRef] {
        &self.features
    }

    pub(crate) fn clear(&mut self) {
        self.features.clear();
    }
}

/// Life-cycle stage of the index; operations are gated on it, so training
/// and tagging cannot mix.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum State {
    Empty,
    Populated,
    WeightsBound,
}

/// Dictionary from `(feature type, value string)` to the list of features
/// observed for that predicate.
///
/// Writes are only allowed while the index is being populated by extraction;
/// cutoffs and compaction follow, then weight slots are bound, after which
/// the structure is immutable for the rest of training.
pub struct AttributeIndex {
    maps: Vec<HashMap<String, u32>>,
    entries: Vec<AttrEntry>,
    trans: Option<u32>,
    state: State,
}

impl Default for AttributeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            maps: (0..NUM_TYPES).map(|_| HashMap::new()).collect(),
            entries: vec![],
            trans: None,
            state: State::Empty,
        }
    }

    /// Counts one observation of the predicate `(ty, value)` against `pair`.
    ///
    /// With `include_trans`, the feature keyed by `pair` itself is counted;
    /// with `include_state`, the state feature keyed by `(NONE, pair.curr)`
    /// is counted as well.
    pub(crate) fn observe(
        &mut self,
        ty: u16,
        value: &str,
        pair: TagPair,
        include_state: bool,
        include_trans: bool,
    ) {
        assert_eq!(self.state, State::Empty, "attribute index is frozen");
        let id = match self.maps[usize::from(ty)].get(value) {
            Some(&id) => id,
            None => {
                let id = self.entries.len() as u32;
                self.maps[usize::from(ty)].insert(value.to_string(), id);
                self.entries.push(AttrEntry {
                    ty,
                    value: value.to_string(),
                    freq: 0,
                    features: vec![],
                });
                if ty == TYPE_TRANS {
                    self.trans = Some(id);
                }
                id
            }
        };
        let entry = &mut self.entries[id as usize];
        if include_trans {
            entry.increment(pair);
        }
        if include_state {
            entry.increment(pair.as_state());
        }
    }

    /// Appends the active features of the predicate `(ty, value)` to
    /// `context`. Unknown or cutoff-pruned predicates contribute nothing.
    pub(crate) fn fill_context(&self, ty: u16, value: &str, context: &mut Context) {
        assert_ne!(self.state, State::Empty, "attribute index is still empty");
        if let Some(&id) = self.maps[usize::from(ty)].get(value) {
            let entry = &self.entries[id as usize];
            if entry.freq == 0 {
                return;
            }
            for (k, feature) in entry.features.iter().enumerate() {
                if feature.freq > 0 {
                    context.features.push((id, k as u32));
                }
            }
        }
    }

    /// Ends the population stage; cutoffs and compaction become legal,
    /// further writes do not.
    pub(crate) fn freeze(&mut self) {
        assert_eq!(self.state, State::Empty, "attribute index already frozen");
        self.state = State::Populated;
    }

    /// Zeroes the aggregate frequency of every entry below `freq`; such
    /// entries are skipped by all later operations.
    pub(crate) fn apply_attribute_cutoff(&mut self, freq: u64) {
        assert_eq!(self.state, State::Populated, "cutoffs need a frozen index");
        for entry in &mut self.entries {
            if entry.freq < freq {
                entry.freq = 0;
            }
        }
    }

    /// Zeroes the count of features below a threshold: `freq` for entries of
    /// type `ty`, `default` for every other entry. Aggregate entry
    /// frequencies decrease accordingly.
    pub(crate) fn apply_feature_cutoff(&mut self, ty: u16, freq: u64, default: u64) {
        assert_eq!(self.state, State::Populated, "cutoffs need a frozen index");
        for entry in &mut self.entries {
            let threshold = if entry.ty == ty { freq } else { default };
            entry.cutoff(threshold);
        }
    }

    /// Drops entries whose aggregate frequency reached zero, orders the rest
    /// by descending frequency (stable) and renumbers them sequentially.
    pub(crate) fn compact(&mut self) {
        assert_eq!(self.state, State::Populated, "compaction needs a frozen index");
        self.entries.retain(|e| e.freq > 0);
        self.entries.sort_by_key(|e| std::cmp::Reverse(e.freq));
        self.rebuild_maps();
    }

    fn rebuild_maps(&mut self) {
        for map in &mut self.maps {
            map.clear();
        }
        self.trans = None;
        for (id, entry) in self.entries.iter().enumerate() {
            self.maps[usize::from(entry.ty)].insert(entry.value.clone(), id as u32);
            if entry.ty == TYPE_TRANS {
                self.trans = Some(id as u32);
            }
        }
    }

    /// Assigns every active feature a distinct slot of the weight vector, in
    /// entry order, and returns the number of slots. The assignment stays
    /// fixed for the remainder of training.
    pub(crate) fn assign_weights(&mut self) -> usize {
        assert_eq!(self.state, State::Populated, "weights are bound after compaction");
        let mut slot = 0;
        for entry in &mut self.entries {
            for feature in &mut entry.features {
                if feature.freq > 0 {
                    feature.slot = slot;
                    slot += 1;
                } else {
                    feature.slot = NO_SLOT;
                }
            }
        }
        self.state = State::WeightsBound;
        slot as usize
    }

    /// The number of active features (and of weight slots once bound).
    pub fn num_features(&self) -> u64 {
        self.entries.iter().map(|e| e.num_active()).sum()
    }

    /// The number of entries.
    pub fn num_attributes(&self) -> u64 {
        self.entries.len() as u64
    }

    #[inline(always)]
    pub(crate) fn feature(&self, fref: FeatRef) -> &Feature {
        &self.entries[fref.0 as usize].features[fref.1 as usize]
    }

    #[inline(always)]
    pub(crate) fn feature_mut(&mut self, fref: FeatRef) -> &mut Feature {
        &mut self.entries[fref.0 as usize].features[fref.1 as usize]
    }

    /// The features of the cached `trans` entry, or an empty slice when the
    /// label-bigram generator was disabled.
    pub(crate) fn trans_features(&self) -> &[Feature] {
        self.trans
            .map(|id| self.entries[id as usize].features.as_slice())
            .unwrap_or(&[])
    }

    /// Zeroes every expectation accumulator; called at the start of each
    /// batch gradient evaluation.
    pub(crate) fn reset_expectations(&mut self) {
        for entry in &mut self.entries {
            for feature in &mut entry.features {
                feature.expectation = 0.0;
            }
        }
    }

    /// Sums the squared weights of all active features.
    pub(crate) fn sum_lambda_sq(&self, weights: &[f64]) -> f64 {
        let mut sum = 0.0;
        for entry in &self.entries {
            for feature in &entry.features {
                if feature.freq > 0 {
                    let lambda = weights[feature.slot as usize];
                    sum += lambda * lambda;
                }
            }
        }
        sum
    }

    /// Writes the gradient of the regularized negative log-likelihood into
    /// `grad`, one value per active feature in slot order:
    /// `expectation − freq + λ/σ²`.
    pub(crate) fn accumulate_gradient(&self, grad: &mut [f64], weights: &[f64], inv_sigma_sq: f64) {
        assert_eq!(self.state, State::WeightsBound, "weights are not bound");
        for entry in &self.entries {
            for feature in &entry.features {
                if feature.freq > 0 {
                    let slot = feature.slot as usize;
                    grad[slot] =
                        feature.expectation - feature.freq as f64 + weights[slot] * inv_sigma_sq;
                }
            }
        }
    }

    /// Writes the `attributes` file: `<type> <value> <freq>` per entry, in
    /// the compacted order that defines attribute ids.
    pub(crate) fn write_attributes<W>(&self, wtr: &mut W, preface: &str) -> Result<()>
    where
        W: Write,
    {
        io::write_preface(wtr, preface)?;
        for entry in &self.entries {
            let name = features::type_name(entry.ty);
            if entry.value.is_empty() {
                writeln!(wtr, "{} {}", name, entry.freq)?;
            } else {
                writeln!(wtr, "{} {} {}", name, entry.value, entry.freq)?;
            }
        }
        Ok(())
    }

    /// Writes the `features` file:
    /// `<attr-id> <prev> <curr> <freq> <lambda>` for every active feature,
    /// grouped by 1-based attribute id in ascending order.
    pub(crate) fn write_features<W>(
        &self,
        wtr: &mut W,
        weights: &[f64],
        preface: &str,
    ) -> Result<()>
    where
        W: Write,
    {
        io::write_preface(wtr, preface)?;
        for (id, entry) in self.entries.iter().enumerate() {
            for feature in &entry.features {
                if feature.freq > 0 {
                    writeln!(
                        wtr,
                        "{} {} {} {} {}",
                        id + 1,
                        feature.pair.prev,
                        feature.pair.curr,
                        feature.freq,
                        weights[feature.slot as usize],
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Reads an `attributes` file written by
    /// [`AttributeIndex::write_attributes`]; features are attached separately
    /// by [`AttributeIndex::read_features`].
    pub(crate) fn read_attributes<R>(uri: &str, rdr: &mut R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut index = Self::new();
        let mut nlines = 0;
        io::read_preface(uri, rdr, &mut nlines)?;

        let mut buf = String::new();
        while io::read_data_line(uri, rdr, &mut nlines, &mut buf)? {
            let tokens: Vec<&str> = buf.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(LegatoError::io_at(
                    uri,
                    nlines,
                    "expected a type, a value and a frequency",
                ));
            }
            let ty = features::type_index(tokens[0]).ok_or_else(|| {
                LegatoError::io_at(uri, nlines, format!("unknown feature type {}", tokens[0]))
            })?;
            let freq = tokens[tokens.len() - 1].parse::<u64>().map_err(|_| {
                LegatoError::io_at(uri, nlines, "could not parse attribute frequency")
            })?;
            let value = tokens[1..tokens.len() - 1].join(" ");

            let id = index.entries.len() as u32;
            index.maps[usize::from(ty)].insert(value.clone(), id);
            if ty == TYPE_TRANS {
                index.trans = Some(id);
            }
            index.entries.push(AttrEntry {
                ty,
                value,
                freq,
                features: vec![],
            });
        }
        index.state = State::Populated;
        Ok(index)
    }

    /// Reads a `features` file, attaching features to the entries of this
    /// index and binding weight slots in file order. Returns the weight
    /// vector.
    ///
    /// # Errors
    ///
    /// [`LegatoError::Io`] on a malformed line; [`LegatoError::Internal`]
    /// when the file disagrees with the expected feature count.
    pub(crate) fn read_features<R>(
        &mut self,
        uri: &str,
        rdr: &mut R,
        nfeatures: u64,
    ) -> Result<Vec<f64>>
    where
        R: BufRead,
    {
        assert_eq!(self.state, State::Populated, "attributes must be read first");
        let mut weights = vec![];
        let mut nlines = 0;
        io::read_preface(uri, rdr, &mut nlines)?;

        let mut previous = 0u64;
        let mut buf = String::new();
        while io::read_data_line(uri, rdr, &mut nlines, &mut buf)? {
            let mut spl = buf.split_whitespace();
            let (id, prev, curr, freq, lambda) =
                match (spl.next(), spl.next(), spl.next(), spl.next(), spl.next(), spl.next()) {
                    (Some(id), Some(prev), Some(curr), Some(freq), Some(lambda), None) => {
                        (id, prev, curr, freq, lambda)
                    }
                    _ => {
                        return Err(LegatoError::io_at(
                            uri,
                            nlines,
                            "could not parse feature tuple",
                        ))
                    }
                };
            let id = id
                .parse::<u64>()
                .map_err(|_| LegatoError::io_at(uri, nlines, "could not parse attribute id"))?;
            if id == 0 || id > self.entries.len() as u64 {
                return Err(LegatoError::io_at(uri, nlines, "attribute id out of range"));
            }
            if id < previous {
                return Err(LegatoError::io_at(
                    uri,
                    nlines,
                    "features are not grouped by ascending attribute id",
                ));
            }
            previous = id;

            let parse_tag = |s: &str| {
                s.parse::<u16>()
                    .map_err(|_| LegatoError::io_at(uri, nlines, "could not parse label id"))
            };
            let pair = TagPair::new(parse_tag(prev)?, parse_tag(curr)?);
            let freq = freq
                .parse::<u64>()
                .map_err(|_| LegatoError::io_at(uri, nlines, "could not parse feature frequency"))?;
            let lambda = lambda
                .parse::<f64>()
                .map_err(|_| LegatoError::io_at(uri, nlines, "could not parse feature weight"))?;

            let slot = weights.len() as u32;
            weights.push(lambda);
            self.entries[(id - 1) as usize].features.push(Feature {
                pair,
                freq,
                slot,
                expectation: 0.0,
            });
        }

        if weights.len() as u64 != nfeatures {
            return Err(LegatoError::internal(format!(
                "number of features read ({}) is not equal to configuration value ({})",
                weights.len(),
                nfeatures,
            )));
        }
        self.state = State::WeightsBound;
        Ok(weights)
    }
}

/// Checks whether `feature` fires on the gold pair of a context: a state
/// feature matches on the current label alone, a transition feature on the
/// whole pair.
#[inline(always)]
pub(crate) fn matches_gold(feature: &Feature, gold: TagPair) -> bool {
    feature.pair == gold || (feature.pair.prev == NONE && feature.pair.curr == gold.curr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SENTINEL;
    use crate::features::{TYPE_PW, TYPE_W};

    fn pair(prev: u16, curr: u16) -> TagPair {
        TagPair::new(prev, curr)
    }

    #[test]
    fn test_observe_counts_state_and_trans() {
        let mut index = AttributeIndex::new();
        index.observe(TYPE_W, "dogs", pair(SENTINEL, 2), true, false);
        index.observe(TYPE_W, "dogs", pair(3, 2), true, false);
        index.observe(TYPE_TRANS, "", pair(3, 2), false, true);

        assert_eq!(index.num_attributes(), 2);
        // Both observations of "dogs" collapse onto the same state feature.
        assert_eq!(index.num_features(), 2);
        assert_eq!(index.trans_features().len(), 1);
        assert_eq!(index.trans_features()[0].pair, pair(3, 2));
    }

    #[test]
    fn test_feature_cutoff_keeps_structure() {
        let mut index = AttributeIndex::new();
        for _ in 0..3 {
            index.observe(TYPE_W, "dogs", pair(SENTINEL, 2), true, false);
        }
        index.observe(TYPE_W, "dogs", pair(SENTINEL, 3), true, false);
        index.observe(TYPE_W, "cats", pair(SENTINEL, 2), true, false);
        index.freeze();
        index.apply_feature_cutoff(TYPE_W, 2, 1);

        // (w="dogs", NONE -> 3) and the whole "cats" entry fall below the
        // cutoff.
        assert_eq!(index.num_features(), 1);
        index.compact();
        assert_eq!(index.num_attributes(), 1);

        let n = index.assign_weights();
        assert_eq!(n, 1);

        let mut context = Context::new(pair(SENTINEL, 2));
        index.fill_context(TYPE_W, "dogs", &mut context);
        assert_eq!(context.features().len(), 1);
        let f = index.feature(context.features()[0]);
        assert_eq!(f.pair, pair(NONE, 2));
        assert_eq!(f.slot, 0);
    }

    #[test]
    fn test_compact_orders_by_freq() {
        let mut index = AttributeIndex::new();
        index.observe(TYPE_W, "rare", pair(SENTINEL, 2), true, false);
        for _ in 0..5 {
            index.observe(TYPE_W, "common", pair(SENTINEL, 2), true, false);
        }
        index.freeze();
        index.compact();

        let mut data = vec![];
        index.write_attributes(&mut data, "# test").unwrap();
        let text = String::from_utf8(data).unwrap();
        assert_eq!(text, "# test\nw common 5\nw rare 1\n");
    }

    #[test]
    fn test_round_trip_preserves_slot_mapping() {
        let mut index = AttributeIndex::new();
        index.observe(TYPE_W, "dogs", pair(SENTINEL, 2), true, false);
        index.observe(TYPE_PW, "dogs", pair(2, 3), true, false);
        index.observe(TYPE_TRANS, "", pair(SENTINEL, 2), false, true);
        index.observe(TYPE_TRANS, "", pair(2, 3), false, true);
        index.freeze();
        index.compact();
        let n = index.assign_weights();
        let weights: Vec<f64> = (0..n).map(|i| i as f64 * 0.5 - 1.0).collect();

        let mut attr_data = vec![];
        let mut feat_data = vec![];
        index.write_attributes(&mut attr_data, "# test").unwrap();
        index.write_features(&mut feat_data, &weights, "# test").unwrap();

        let mut reloaded =
            AttributeIndex::read_attributes("attributes", &mut attr_data.as_slice()).unwrap();
        let reloaded_weights = reloaded
            .read_features("features", &mut feat_data.as_slice(), n as u64)
            .unwrap();
        assert_eq!(reloaded_weights, weights);
        assert_eq!(reloaded.num_attributes(), index.num_attributes());

        // The slot of every (type, value, prev, curr) is unchanged.
        let mut before = Context::new(pair(SENTINEL, 2));
        index.fill_context(TYPE_PW, "dogs", &mut before);
        let mut after = Context::new(pair(SENTINEL, 2));
        reloaded.fill_context(TYPE_PW, "dogs", &mut after);
        assert_eq!(before.features().len(), after.features().len());
        for (&b, &a) in before.features().iter().zip(after.features()) {
            assert_eq!(index.feature(b).pair, reloaded.feature(a).pair);
            assert_eq!(index.feature(b).slot, reloaded.feature(a).slot);
        }
    }

    #[test]
    fn test_feature_count_mismatch_is_internal() {
        let mut index = AttributeIndex::new();
        index.observe(TYPE_TRANS, "", pair(SENTINEL, 2), false, true);
        index.freeze();
        index.compact();
        let n = index.assign_weights();
        let weights = vec![0.0; n];

        let mut attr_data = vec![];
        let mut feat_data = vec![];
        index.write_attributes(&mut attr_data, "# test").unwrap();
        index.write_features(&mut feat_data, &weights, "# test").unwrap();

        let mut reloaded =
            AttributeIndex::read_attributes("attributes", &mut attr_data.as_slice()).unwrap();
        let e = reloaded.read_features("features", &mut feat_data.as_slice(), 7);
        assert!(matches!(e, Err(LegatoError::Internal(_))));
    }
}
