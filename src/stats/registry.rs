use std::collections::HashMap;
use std::sync::Arc;

use super::{
    engine::{ReplayEngine, ScoringRule, VariantCalculator},
    models::StatisticsRow,
    rules::*,
    StatsError,
};
use crate::leg::Leg;
use crate::matches::MatchType;

/// Maps each variant to the calculator that replays its legs.
pub struct StatisticsRegistry {
    calculators: HashMap<MatchType, Arc<dyn VariantCalculator>>,
}

impl StatisticsRegistry {
    pub fn builder() -> StatisticsRegistryBuilder {
        StatisticsRegistryBuilder::new()
    }

    /// A registry without any rules, for callers that register their own.
    pub fn empty() -> StatisticsRegistryBuilder {
        StatisticsRegistryBuilder {
            calculators: HashMap::new(),
        }
    }

    pub fn calculator(&self, match_type: MatchType) -> Result<&dyn VariantCalculator, StatsError> {
        self.calculators
            .get(&match_type)
            .map(|c| c.as_ref())
            .ok_or(StatsError::UnsupportedMatchType(match_type))
    }

    pub fn table_for(&self, match_type: MatchType) -> Result<&'static str, StatsError> {
        Ok(self.calculator(match_type)?.table())
    }

    pub fn supports(&self, match_type: MatchType) -> bool {
        self.calculators.contains_key(&match_type)
    }

    pub fn calculate(&self, leg: &Leg) -> Result<Vec<StatisticsRow>, StatsError> {
        self.calculator(leg.leg_type)?.calculate(leg)
    }
}

impl Default for StatisticsRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct StatisticsRegistryBuilder {
    calculators: HashMap<MatchType, Arc<dyn VariantCalculator>>,
}

impl StatisticsRegistryBuilder {
    fn new() -> Self {
        Self::default_rules(Self {
            calculators: HashMap::new(),
        })
    }

    fn default_rules(builder: Self) -> Self {
        builder
            .with_rule(X01Rule)
            .with_rule(ShootoutRule)
            .with_rule(CricketRule)
            .with_rule(DartsAtXRule)
            .with_rule(AroundTheWorldRule::around_the_world())
            .with_rule(AroundTheWorldRule::shanghai())
            .with_rule(AroundTheClockRule)
            .with_rule(TicTacToeRule)
            .with_rule(BermudaTriangleRule)
            .with_rule(FourTwentyRule)
            .with_rule(KillBullRule)
            .with_rule(GotchaRule)
            .with_rule(JdcPracticeRule)
            .with_rule(KnockoutRule)
            .with_rule(ScamRule)
    }

    /// Registers `rule` for every variant it declares, replacing any earlier one.
    pub fn with_rule<R: ScoringRule + 'static>(self, rule: R) -> Self {
        self.with_calculator(Arc::new(ReplayEngine::new(rule)))
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn VariantCalculator>) -> Self {
        for match_type in calculator.match_types() {
            self.calculators
                .insert(*match_type, Arc::clone(&calculator));
        }
        self
    }

    pub fn build(self) -> StatisticsRegistry {
        StatisticsRegistry {
            calculators: self.calculators,
        }
    }
}
