use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    ExecutionContext, NodeError, Secrets,
    executor::{
        Executor, NodeResult,
        actions::{parse_config, primary_input, select},
    },
};

use super::models::*;

/// Keeps the array items that satisfy every condition.
pub struct DataFilterAction;

impl DataFilterAction {
    fn matches(
        item: &Value,
        conditions: &[Condition],
    ) -> bool {
        conditions.iter().all(|c| Self::evaluate(select(item, &c.field), c.operator, c.value.as_ref()))
    }

    /// Evaluate a single comparison
    fn evaluate(
        actual: Option<&Value>,
        operator: ComparisonOperator,
        expected: Option<&Value>,
    ) -> bool {
        if operator == ComparisonOperator::Exists {
            return Self::eval_exists(actual, expected);
        }

        let (Some(actual), Some(expected)) = (actual, expected) else {
            // a missing field only satisfies `ne`
            return operator == ComparisonOperator::Ne && actual.is_none();
        };

        match operator {
            ComparisonOperator::Eq => Self::eval_eq(actual, expected),
            ComparisonOperator::Ne => !Self::eval_eq(actual, expected),
            ComparisonOperator::Gt => Self::eval_cmp(actual, expected).is_some_and(Ordering::is_gt),
            ComparisonOperator::Gte => Self::eval_cmp(actual, expected).is_some_and(Ordering::is_ge),
            ComparisonOperator::Lt => Self::eval_cmp(actual, expected).is_some_and(Ordering::is_lt),
            ComparisonOperator::Lte => Self::eval_cmp(actual, expected).is_some_and(Ordering::is_le),
            ComparisonOperator::Contains => Self::eval_contains(actual, expected),
            ComparisonOperator::Exists => Self::eval_exists(Some(actual), Some(expected)),
        }
    }

    fn eval_exists(
        actual: Option<&Value>,
        expected: Option<&Value>,
    ) -> bool {
        let present = actual.is_some_and(|v| !v.is_null());
        let wanted = expected.and_then(Value::as_bool).unwrap_or(true);
        present == wanted
    }

    fn eval_eq(
        actual: &Value,
        expected: &Value,
    ) -> bool {
        match (actual, expected) {
            (Value::Number(a), Value::Number(e)) => a.as_f64() == e.as_f64(),
            // scraped numbers often arrive as text
            (Value::String(a), Value::Number(e)) => a.trim().parse::<f64>().ok() == e.as_f64(),
            (Value::Number(a), Value::String(e)) => e.trim().parse::<f64>().ok() == a.as_f64(),
            _ => actual == expected,
        }
    }

    fn eval_cmp(
        actual: &Value,
        expected: &Value,
    ) -> Option<Ordering> {
        let number = |v: &Value| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match (actual, expected) {
            (Value::String(a), Value::String(e)) => match (a.trim().parse::<f64>(), e.trim().parse::<f64>()) {
                (Ok(a), Ok(e)) => a.partial_cmp(&e),
                _ => Some(a.cmp(e)),
            },
            _ => number(actual)?.partial_cmp(&number(expected)?),
        }
    }

    fn eval_contains(
        actual: &Value,
        expected: &Value,
    ) -> bool {
        match (actual, expected) {
            (Value::String(s), Value::String(e)) => s.contains(e.as_str()),
            (Value::Array(arr), e) => arr.iter().any(|v| Self::eval_eq(v, e)),
            (Value::Object(obj), Value::String(key)) => obj.contains_key(key),
            _ => false,
        }
    }
}

#[async_trait]
impl Executor for DataFilterAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["conditions"],
            "properties": {
                "pointer": {
                    "type": "string",
                    "description": "JSON pointer to the array in the input envelope"
                },
                "conditions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["field", "operator"],
                        "properties": {
                            "field": { "type": "string" },
                            "operator": {
                                "type": "string",
                                "enum": ["eq", "ne", "gt", "gte", "lt", "lte", "contains", "exists"]
                            },
                            "value": {}
                        }
                    }
                }
            }
        })
    }

    async fn execute(
        &self,
        input: Value,
        config: &Value,
        _secrets: &Secrets,
        ctx: &ExecutionContext,
    ) -> NodeResult {
        let config: FilterConfig = parse_config(config)?;
        let data = match &config.pointer {
            Some(pointer) => input.pointer(pointer).cloned().ok_or_else(|| NodeError::execution(format!("nothing to filter at '{}'", pointer)))?,
            None => primary_input(&input),
        };
        let Value::Array(items) = data else {
            return Err(NodeError::execution("Data Filter expects an array input"));
        };

        let total = items.len();
        let kept: Vec<Value> = items.into_iter().filter(|item| Self::matches(item, &config.conditions)).collect();
        ctx.emit_log(format!("kept {} of {} item(s)", kept.len(), total));
        Ok(Value::Array(kept))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn filter(
        input: Value,
        config: Value,
    ) -> NodeResult {
        DataFilterAction.execute(input, &config, &Secrets::default(), &ExecutionContext::new("r1", "filter")).await
    }

    fn products() -> Value {
        json!({"input": [
            {"name": "lamp", "price": 25, "tags": ["home"]},
            {"name": "desk", "price": "120.5", "tags": ["home", "office"]},
            {"name": "pen", "price": 2},
            {"name": "gift card"}
        ]})
    }

    #[tokio::test]
    async fn test_numeric_comparisons() {
        let out = filter(products(), json!({"conditions": [{"field": "price", "operator": "gte", "value": 25}]})).await.unwrap();
        let names: Vec<&str> = out.as_array().unwrap().iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["lamp", "desk"]);

        let out = filter(products(), json!({"conditions": [{"field": "/price", "operator": "lt", "value": 25}]})).await.unwrap();
        assert_eq!(out, json!([{"name": "pen", "price": 2}]));
    }

    #[tokio::test]
    async fn test_contains_exists_and_conjunction() {
        let out = filter(
            products(),
            json!({"conditions": [
                {"field": "tags", "operator": "contains", "value": "home"},
                {"field": "name", "operator": "ne", "value": "lamp"}
            ]}),
        )
        .await
        .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 1);
        assert_eq!(out[0]["name"], "desk");

        let out = filter(products(), json!({"conditions": [{"field": "price", "operator": "exists", "value": false}]})).await.unwrap();
        assert_eq!(out, json!([{"name": "gift card"}]));
    }

    #[tokio::test]
    async fn test_eq_and_missing_fields() {
        let out = filter(products(), json!({"conditions": [{"field": "price", "operator": "eq", "value": 120.5}]})).await.unwrap();
        assert_eq!(out[0]["name"], "desk");

        let out = filter(products(), json!({"conditions": [{"field": "price", "operator": "ne", "value": 2}]})).await.unwrap();
        assert_eq!(out.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_non_array_input_fails() {
        let err = filter(json!({"input": {"a": 1}}), json!({"conditions": []})).await.unwrap_err();
        assert!(matches!(err, NodeError::Execution { .. }));
    }
}
