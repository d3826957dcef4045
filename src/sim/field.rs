//! Field and coupling registry.
//!
//! Describes, per physical field, what is solved and how, and the couplings
//! that order fields within a coupled pass.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigError;
use crate::sim::adaptivity::{AdaptivityPolicy, AdaptivityStrategy};
use crate::sim::assembly::WeakForms;
use crate::sim::nonlinear::NonlinearSettings;
use crate::sim::transient::TimeSettings;

/// Index of a field in its [`FieldRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub usize);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    SteadyState,
    Harmonic,
    Transient,
}

/// Everything needed to solve one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub analysis: AnalysisType,
    pub weak_forms: WeakForms,
    pub nonlinear: NonlinearSettings,
    pub adaptivity: AdaptivityPolicy,
    /// Time discretization, used when `analysis` is transient.
    pub time: TimeSettings,
    /// Uniform initial value of a transient field.
    pub initial_condition: f64,
    /// Frequency (Hz) of a harmonic field.
    pub frequency: f64,
}

impl FieldConfig {
    pub fn new(name: &str, weak_forms: WeakForms) -> Self {
        Self {
            name: name.to_string(),
            analysis: AnalysisType::SteadyState,
            weak_forms,
            nonlinear: NonlinearSettings::default(),
            adaptivity: AdaptivityPolicy::default(),
            time: TimeSettings::default(),
            initial_condition: 0.0,
            frequency: 0.0,
        }
    }

    pub fn transient(mut self, time: TimeSettings, initial_condition: f64) -> Self {
        self.analysis = AnalysisType::Transient;
        self.time = time;
        self.initial_condition = initial_condition;
        self
    }

    pub fn harmonic(mut self, frequency: f64) -> Self {
        self.analysis = AnalysisType::Harmonic;
        self.frequency = frequency;
        self
    }

    pub fn with_nonlinear(mut self, nonlinear: NonlinearSettings) -> Self {
        self.nonlinear = nonlinear;
        self
    }

    pub fn with_adaptivity(mut self, adaptivity: AdaptivityPolicy) -> Self {
        self.adaptivity = adaptivity;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.analysis == AnalysisType::Transient
    }

    /// Checks the field on its own, before any solve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis == AnalysisType::Harmonic && !(self.frequency > 0.0) {
            return Err(ConfigError::InvalidFrequency {
                field: self.name.clone(),
                frequency: self.frequency,
            });
        }
        if self.is_transient() {
            self.time.validate(&self.name)?;
            if self.time.method.is_adaptive()
                && self.adaptivity.strategy != AdaptivityStrategy::Disabled
            {
                return Err(ConfigError::SpaceAndTimeAdaptivity {
                    field: self.name.clone(),
                });
            }
        }
        self.weak_forms.validate()?;
        self.nonlinear.validate()?;
        self.adaptivity.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingKind {
    /// Target uses the source's solution from the previous pass.
    Weak,
    /// Fully simultaneous solve. Not supported; solved as weak.
    Hard,
}

/// `source` feeds `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingEdge {
    pub source: FieldId,
    pub target: FieldId,
    pub kind: CouplingKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRegistry {
    fields: Vec<FieldConfig>,
    couplings: Vec<CouplingEdge>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&mut self, field: FieldConfig) -> FieldId {
        self.fields.push(field);
        FieldId(self.fields.len() - 1)
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldConfig> {
        self.fields.get(id.0)
    }

    pub fn fields(&self) -> &[FieldConfig] {
        &self.fields
    }

    pub fn ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len()).map(FieldId)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn add_coupling(
        &mut self,
        source: FieldId,
        target: FieldId,
        kind: CouplingKind,
    ) -> Result<(), ConfigError> {
        for id in [source, target] {
            if self.field(id).is_none() {
                return Err(ConfigError::UnknownField(id.0));
            }
        }
        if source == target {
            return Err(ConfigError::SelfCoupling(source.0));
        }
        self.couplings.retain(|c| !(c.source == source && c.target == target));
        self.couplings.push(CouplingEdge {
            source,
            target,
            kind,
        });
        Ok(())
    }

    /// Couplings as declared.
    pub fn couplings(&self) -> &[CouplingEdge] {
        &self.couplings
    }

    pub fn has_couplings(&self) -> bool {
        !self.couplings.is_empty()
    }

    /// Couplings as they are solved: hard couplings are downgraded to weak.
    pub fn effective_couplings(&self) -> Vec<CouplingEdge> {
        self.couplings
            .iter()
            .map(|c| {
                if c.kind == CouplingKind::Hard {
                    warn!(
                        source = %c.source,
                        target = %c.target,
                        "Hard coupling is not supported, solving as weak coupling"
                    );
                }
                CouplingEdge {
                    kind: CouplingKind::Weak,
                    ..*c
                }
            })
            .collect()
    }

    /// Sources feeding `target`.
    pub fn sources_of(&self, target: FieldId) -> Vec<FieldId> {
        self.couplings
            .iter()
            .filter(|c| c.target == target)
            .map(|c| c.source)
            .collect()
    }

    pub fn is_transient(&self) -> bool {
        self.fields.iter().any(FieldConfig::is_transient)
    }

    /// Time settings driving the simulation clock (first transient field).
    pub fn time_settings(&self) -> Option<&TimeSettings> {
        self.fields.iter().find(|f| f.is_transient()).map(|f| &f.time)
    }

    /// Checks all fields and couplings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fields.is_empty() {
            return Err(ConfigError::NoFields);
        }
        for f in &self.fields {
            f.validate()?;
        }
        if let Some(clock) = self.time_settings() {
            for f in self.fields.iter().filter(|f| f.is_transient()) {
                if f.time.total_time != clock.total_time {
                    return Err(ConfigError::InconsistentTimeSettings("total time"));
                }
            }
        }
        self.check_hard_cycles()
    }

    /// A cycle through a hard coupling cannot be solved by frozen inputs.
    fn check_hard_cycles(&self) -> Result<(), ConfigError> {
        for hard in self.couplings.iter().filter(|c| c.kind == CouplingKind::Hard) {
            if let Some(mut path) = self.path(hard.target, hard.source) {
                path.insert(0, hard.source.0);
                return Err(ConfigError::HardCouplingCycle(path));
            }
        }
        Ok(())
    }

    /// Whether `field` lies on a coupling cycle through fields not yet placed.
    fn is_on_cycle(&self, field: usize, placed: &[bool]) -> bool {
        let mut seen = vec![false; self.fields.len()];
        let mut queue = VecDeque::from([field]);
        while let Some(n) = queue.pop_front() {
            for c in self.couplings.iter().filter(|c| c.source.0 == n) {
                let t = c.target.0;
                if t == field {
                    return true;
                }
                if !placed[t] && !seen[t] {
                    seen[t] = true;
                    queue.push_back(t);
                }
            }
        }
        false
    }

    /// Field ids on a coupling path `from -> ... -> to`, if any.
    fn path(&self, from: FieldId, to: FieldId) -> Option<Vec<usize>> {
        let mut parent: Vec<Option<usize>> = vec![None; self.fields.len()];
        let mut seen = vec![false; self.fields.len()];
        let mut queue = VecDeque::from([from.0]);
        seen[from.0] = true;
        while let Some(n) = queue.pop_front() {
            if n == to.0 {
                let mut path = vec![n];
                let mut cur = n;
                while let Some(p) = parent[cur] {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            for c in self.couplings.iter().filter(|c| c.source.0 == n) {
                if !seen[c.target.0] {
                    seen[c.target.0] = true;
                    parent[c.target.0] = Some(n);
                    queue.push_back(c.target.0);
                }
            }
        }
        None
    }

    /// Groups fields into dependency levels for a coupled pass.
    ///
    /// Fields in one level do not depend on each other and may be solved in
    /// parallel; a level only starts when the previous one has finished. Weak
    /// cycles are broken at the lowest field id, which then reads the frozen
    /// solution of the previous pass.
    pub fn levels(&self) -> Result<Vec<Vec<FieldId>>, ConfigError> {
        self.check_hard_cycles()?;
        let n = self.fields.len();
        let mut indegree = vec![0usize; n];
        for c in &self.couplings {
            indegree[c.target.0] += 1;
        }
        let mut placed = vec![false; n];
        let mut levels = Vec::new();
        let mut remaining = n;
        while remaining > 0 {
            let mut level: Vec<usize> = (0..n).filter(|&i| !placed[i] && indegree[i] == 0).collect();
            if level.is_empty() {
                // Weak cycle: its lowest id goes first
                let first = (0..n)
                    .find(|&i| !placed[i] && self.is_on_cycle(i, &placed))
                    .or_else(|| (0..n).find(|&i| !placed[i]));
                level.extend(first);
            }
            for &i in &level {
                placed[i] = true;
                remaining -= 1;
            }
            for &i in &level {
                for c in self.couplings.iter().filter(|c| c.source.0 == i) {
                    let t = c.target.0;
                    if !placed[t] {
                        indegree[t] = indegree[t].saturating_sub(1);
                    }
                }
            }
            levels.push(level.into_iter().map(FieldId).collect());
        }
        Ok(levels)
    }
}
