use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::StatsError;
use crate::shared::{LegId, PlayerId};

/// One pending or stored statistics row: a variant's aggregate for one
/// player in one leg, keyed by `(table, leg_id, player_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub table: String,
    pub leg_id: LegId,
    pub player_id: PlayerId,
    pub fields: BTreeMap<String, Value>,
}

impl StatisticsRow {
    pub fn from_statistics<T: Serialize>(
        table: &str,
        leg_id: LegId,
        player_id: PlayerId,
        statistics: &T,
    ) -> Result<Self, StatsError> {
        let fields = match serde_json::to_value(statistics) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            Ok(other) => {
                return Err(StatsError::Replay(format!(
                    "{table} statistics must serialize to an object, got {other}"
                )))
            }
            Err(e) => return Err(StatsError::Replay(e.to_string())),
        };

        Ok(Self {
            table: table.to_string(),
            leg_id,
            player_id,
            fields,
        })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Renders the idempotent update statement logged by dry runs.
impl fmt::Display for StatisticsRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assignments = self
            .fields
            .iter()
            .map(|(field, value)| format!("{} = {}", field, sql_literal(value)))
            .collect::<Vec<_>>()
            .join(", ");

        write!(
            f,
            "UPDATE {} SET {} WHERE leg_id = {} AND player_id = {};",
            self.table, assignments, self.leg_id, self.player_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        ppd: f64,
        checkout: Option<i32>,
        darts_thrown: u32,
    }

    #[test]
    fn fields_are_ordered_by_name() {
        let row = StatisticsRow::from_statistics(
            "statistics_x01",
            4,
            2,
            &Sample {
                ppd: 16.5,
                checkout: None,
                darts_thrown: 18,
            },
        )
        .unwrap();

        let names: Vec<&str> = row.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["checkout", "darts_thrown", "ppd"]);
        assert_eq!(row.get_i64("darts_thrown"), Some(18));
        assert_eq!(row.get_f64("ppd"), Some(16.5));
    }

    #[test]
    fn renders_update_statement() {
        let row = StatisticsRow::from_statistics(
            "statistics_x01",
            4,
            2,
            &Sample {
                ppd: 16.5,
                checkout: Some(40),
                darts_thrown: 18,
            },
        )
        .unwrap();

        assert_eq!(
            row.to_string(),
            "UPDATE statistics_x01 SET checkout = 40, darts_thrown = 18, ppd = 16.5 \
             WHERE leg_id = 4 AND player_id = 2;"
        );
    }

    #[test]
    fn null_and_nested_values_are_quoted() {
        let mut row = StatisticsRow {
            table: "statistics_test".into(),
            leg_id: 1,
            player_id: 1,
            fields: BTreeMap::new(),
        };
        row.fields.insert("a".into(), Value::Null);
        row.fields
            .insert("b".into(), serde_json::json!({"20": 0.5}));

        assert_eq!(
            row.to_string(),
            "UPDATE statistics_test SET a = NULL, b = '{\"20\":0.5}' WHERE leg_id = 1 AND player_id = 1;"
        );
    }

    #[test]
    fn non_object_statistics_are_rejected() {
        let result = StatisticsRow::from_statistics("statistics_test", 1, 1, &5);
        assert!(matches!(result, Err(StatsError::Replay(_))));
    }
}
