//! Configuration surface of the scheduler: the algorithm family and the
//! knobs every solver reads. Flag parsing itself lives in the application
//! crate; this module only defines the value types and their names.

use std::str::FromStr;
use std::time::Duration;

pub use crate::problem::ShopType;

/// The solver families. Names follow the command line (`--algorithm`).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum AlgorithmType {
    /// Bounded heuristic constraint scheduler: ranked forward insertion.
    #[default]
    Bhcs,
    /// Multi-dimensional BHCS keeping a Pareto frontier of partials.
    Mdbhcs,
    /// Maintenance-aware BHCS, evaluating after every insertion.
    Mibhcs,
    /// BHCS with maintenance simulated once after scheduling.
    Misim,
    /// Insert each operation at its first feasible position.
    Asap,
    /// ASAP with backtracking over insertion points.
    AsapBacktrack,
    /// Maintenance-aware ASAP.
    Miasap,
    /// ASAP with maintenance as a post-scheduling decision.
    Miasapsim,
    /// MNEH sequence-rebuild heuristic.
    Mneh,
    /// MNEH seeded with an ASAP sequence.
    MnehAsap,
    /// MNEH seeded with an ASAP-backtracking sequence.
    MnehAsapBacktrack,
    /// MNEH seeded with a BHCS sequence (combined weights).
    MnehBhcsCombi,
    /// MNEH seeded with a flexibility-only BHCS sequence.
    MnehBhcsFlexible,
    /// Maintenance-aware MNEH.
    Mineh,
    /// MNEH with maintenance as a post-scheduling decision.
    Minehsim,
    /// Branch-and-bound over insertion options.
    BranchBound,
    /// Replay a sequence file.
    GivenSequence,
    /// Anytime forward heuristic under a per-operation budget.
    Anytime,
    /// Decision-diagram (schedule abstraction graph) solver.
    Dd,
    /// Decision-diagram solver seeded with a heuristic solution.
    DdSeed,
    /// One job at a time through the re-entrant loop; no interleaving.
    Simple,
}

impl AlgorithmType {
    pub const ALL: [AlgorithmType; 21] = [
        AlgorithmType::Bhcs,
        AlgorithmType::Mdbhcs,
        AlgorithmType::Mibhcs,
        AlgorithmType::Misim,
        AlgorithmType::Asap,
        AlgorithmType::AsapBacktrack,
        AlgorithmType::Miasap,
        AlgorithmType::Miasapsim,
        AlgorithmType::Mneh,
        AlgorithmType::MnehAsap,
        AlgorithmType::MnehAsapBacktrack,
        AlgorithmType::MnehBhcsCombi,
        AlgorithmType::MnehBhcsFlexible,
        AlgorithmType::Mineh,
        AlgorithmType::Minehsim,
        AlgorithmType::BranchBound,
        AlgorithmType::GivenSequence,
        AlgorithmType::Anytime,
        AlgorithmType::Dd,
        AlgorithmType::DdSeed,
        AlgorithmType::Simple,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            AlgorithmType::Bhcs => "bhcs",
            AlgorithmType::Mdbhcs => "mdbhcs",
            AlgorithmType::Mibhcs => "mibhcs",
            AlgorithmType::Misim => "misim",
            AlgorithmType::Asap => "asap",
            AlgorithmType::AsapBacktrack => "asap-backtrack",
            AlgorithmType::Miasap => "miasap",
            AlgorithmType::Miasapsim => "miasapsim",
            AlgorithmType::Mneh => "mneh",
            AlgorithmType::MnehAsap => "mneh-asap",
            AlgorithmType::MnehAsapBacktrack => "mneh-asap-backtrack",
            AlgorithmType::MnehBhcsCombi => "mneh-bhcs-combi",
            AlgorithmType::MnehBhcsFlexible => "mneh-bhcs-flexible",
            AlgorithmType::Mineh => "mineh",
            AlgorithmType::Minehsim => "minehsim",
            AlgorithmType::BranchBound => "branch-bound",
            AlgorithmType::GivenSequence => "sequence",
            AlgorithmType::Anytime => "anytime",
            AlgorithmType::Dd => "dd",
            AlgorithmType::DdSeed => "ddseed",
            AlgorithmType::Simple => "simple",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AlgorithmType::Bhcs => "bounded heuristic constraint scheduler",
            AlgorithmType::Mdbhcs => "multi-dimensional BHCS (Pareto frontier)",
            AlgorithmType::Mibhcs => "maintenance-aware BHCS",
            AlgorithmType::Misim => "BHCS with simulated maintenance insertion",
            AlgorithmType::Asap => "first-feasible (as soon as possible) insertion",
            AlgorithmType::AsapBacktrack => "ASAP insertion with backtracking",
            AlgorithmType::Miasap => "maintenance-aware ASAP",
            AlgorithmType::Miasapsim => "ASAP with simulated maintenance insertion",
            AlgorithmType::Mneh => "MNEH sequence rebuild",
            AlgorithmType::MnehAsap => "MNEH seeded by ASAP",
            AlgorithmType::MnehAsapBacktrack => "MNEH seeded by ASAP-backtracking",
            AlgorithmType::MnehBhcsCombi => "MNEH seeded by BHCS (combined weights)",
            AlgorithmType::MnehBhcsFlexible => "MNEH seeded by BHCS (flexibility only)",
            AlgorithmType::Mineh => "maintenance-aware MNEH",
            AlgorithmType::Minehsim => "MNEH with simulated maintenance insertion",
            AlgorithmType::BranchBound => "branch-and-bound",
            AlgorithmType::GivenSequence => "schedule a given sequence",
            AlgorithmType::Anytime => "anytime forward heuristic",
            AlgorithmType::Dd => "decision-diagram (schedule abstraction graph) solver",
            AlgorithmType::DdSeed => "decision-diagram solver around a seed solution",
            AlgorithmType::Simple => "no-interleaving baseline",
        }
    }

    /// True for the family that splices maintenance operations while or
    /// after scheduling.
    pub fn is_maintenance_aware(self) -> bool {
        matches!(
            self,
            AlgorithmType::Mibhcs
                | AlgorithmType::Misim
                | AlgorithmType::Miasap
                | AlgorithmType::Miasapsim
                | AlgorithmType::Mineh
                | AlgorithmType::Minehsim
        )
    }

    /// True for the maintenance variants that only simulate insertion after
    /// the full sequence is built.
    pub fn is_maintenance_simulated(self) -> bool {
        matches!(
            self,
            AlgorithmType::Misim | AlgorithmType::Miasapsim | AlgorithmType::Minehsim
        )
    }

    /// True when insertion options are ranked by earliest start only.
    pub fn uses_asap_ranking(self) -> bool {
        matches!(
            self,
            AlgorithmType::Asap | AlgorithmType::Miasap | AlgorithmType::Miasapsim
        )
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.short_name() == s)
            .ok_or_else(|| format!("unknown algorithm '{s}'"))
    }
}

/// Inter-module propagation algorithm.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ModularAlgorithmType {
    #[default]
    Broadcast,
    Cocktail,
}

impl ModularAlgorithmType {
    pub const ALL: [ModularAlgorithmType; 2] =
        [ModularAlgorithmType::Broadcast, ModularAlgorithmType::Cocktail];

    pub fn short_name(self) -> &'static str {
        match self {
            ModularAlgorithmType::Broadcast => "broadcast",
            ModularAlgorithmType::Cocktail => "cocktail",
        }
    }
}

impl FromStr for ModularAlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.short_name() == s)
            .ok_or_else(|| format!("unknown modular algorithm '{s}'"))
    }
}

/// How modules pick their algorithm when several `--algorithm` flags are
/// given for a modular run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum MultiAlgorithmBehaviour {
    First,
    #[default]
    Divide,
    Interleave,
    Last,
    Random,
}

impl MultiAlgorithmBehaviour {
    pub const ALL: [MultiAlgorithmBehaviour; 5] = [
        MultiAlgorithmBehaviour::First,
        MultiAlgorithmBehaviour::Divide,
        MultiAlgorithmBehaviour::Interleave,
        MultiAlgorithmBehaviour::Last,
        MultiAlgorithmBehaviour::Random,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            MultiAlgorithmBehaviour::First => "first",
            MultiAlgorithmBehaviour::Divide => "divide",
            MultiAlgorithmBehaviour::Interleave => "interleave",
            MultiAlgorithmBehaviour::Last => "last",
            MultiAlgorithmBehaviour::Random => "random",
        }
    }
}

impl FromStr for MultiAlgorithmBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.short_name() == s)
            .ok_or_else(|| format!("unknown multi-algorithm behaviour '{s}'"))
    }
}

/// Queue discipline of the decision-diagram solver.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum DdExplorationType {
    Breadth,
    Depth,
    Best,
    #[default]
    Static,
    Adaptive,
}

impl DdExplorationType {
    pub const ALL: [DdExplorationType; 5] = [
        DdExplorationType::Breadth,
        DdExplorationType::Depth,
        DdExplorationType::Best,
        DdExplorationType::Static,
        DdExplorationType::Adaptive,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            DdExplorationType::Breadth => "breadth",
            DdExplorationType::Depth => "depth",
            DdExplorationType::Best => "best",
            DdExplorationType::Static => "static",
            DdExplorationType::Adaptive => "adaptive",
        }
    }
}

impl FromStr for DdExplorationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.short_name() == s)
            .ok_or_else(|| format!("unknown exploration type '{s}'"))
    }
}

/// Reducer that shrinks a Pareto generation back to the configured size.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum SelectionOperatorType {
    /// Linear selection over the two-objective projection.
    #[default]
    Environmental,
    /// Angular selection over the flattened objective product.
    Geometric,
}

impl SelectionOperatorType {
    pub const ALL: [SelectionOperatorType; 2] = [
        SelectionOperatorType::Environmental,
        SelectionOperatorType::Geometric,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            SelectionOperatorType::Environmental => "environmental",
            SelectionOperatorType::Geometric => "geometric",
        }
    }
}

impl FromStr for SelectionOperatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.short_name() == s)
            .ok_or_else(|| format!("unknown selection operator '{s}'"))
    }
}

/// Format of the result file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Cbor,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "cbor" => Ok(OutputFormat::Cbor),
            _ => Err(format!("unknown output format '{s}'")),
        }
    }
}

impl FromStr for ShopType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow" => Ok(ShopType::Flow),
            "job" => Ok(ShopType::Job),
            "fixedorder" => Ok(ShopType::FixedOrder),
            _ => Err(format!("unknown shop type '{s}'")),
        }
    }
}

/// Options of the modular propagator.
#[derive(Clone, Debug)]
pub struct ModularOptions {
    pub store_bounds: bool,
    pub store_sequence: bool,
    pub no_self_bounds: bool,
    pub max_iterations: u64,
    pub time_out: Duration,
}

impl Default for ModularOptions {
    fn default() -> Self {
        ModularOptions {
            store_bounds: false,
            store_sequence: false,
            no_self_bounds: false,
            max_iterations: u64::MAX,
            time_out: Duration::from_millis(5000),
        }
    }
}

/// Everything a solver run needs to know. Defaults match the command line
/// defaults.
#[derive(Clone, Debug)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: String,
    pub sequence_file: String,
    pub maint_policy_file: String,
    pub verbose: u8,
    pub productivity_weight: f64,
    pub flexibility_weight: f64,
    pub tie_weight: f64,
    pub time_out: Duration,
    pub max_iterations: u64,
    pub max_partial_solutions: u32,
    pub selection_operator: SelectionOperatorType,
    pub algorithm: AlgorithmType,
    pub algorithms: Vec<AlgorithmType>,
    pub modular_algorithm: ModularAlgorithmType,
    pub output_format: OutputFormat,
    pub shop_type: ShopType,
    pub exploration_type: DdExplorationType,
    pub multi_algorithm_behaviour: MultiAlgorithmBehaviour,
    pub modular_options: ModularOptions,
}

impl Default for CliArgs {
    fn default() -> Self {
        CliArgs {
            input_file: String::new(),
            output_file: String::new(),
            sequence_file: String::new(),
            maint_policy_file: String::new(),
            verbose: 0,
            productivity_weight: 0.70,
            flexibility_weight: 0.25,
            tie_weight: 0.05,
            time_out: Duration::from_millis(5000),
            max_iterations: u64::MAX,
            max_partial_solutions: 5,
            selection_operator: SelectionOperatorType::default(),
            algorithm: AlgorithmType::Bhcs,
            algorithms: vec![AlgorithmType::Bhcs],
            modular_algorithm: ModularAlgorithmType::default(),
            output_format: OutputFormat::default(),
            shop_type: ShopType::default(),
            exploration_type: DdExplorationType::default(),
            multi_algorithm_behaviour: MultiAlgorithmBehaviour::default(),
            modular_options: ModularOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_round_trip() {
        for algorithm in AlgorithmType::ALL {
            assert_eq!(algorithm.short_name().parse::<AlgorithmType>(), Ok(algorithm));
        }
        for operator in SelectionOperatorType::ALL {
            assert_eq!(
                operator.short_name().parse::<SelectionOperatorType>(),
                Ok(operator)
            );
        }
    }

    #[test]
    fn default_weights() {
        let args = CliArgs::default();
        assert_eq!(args.productivity_weight, 0.70);
        assert_eq!(args.flexibility_weight, 0.25);
        assert_eq!(args.tie_weight, 0.05);
        assert_eq!(args.max_partial_solutions, 5);
    }
}
