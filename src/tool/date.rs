use async_trait::async_trait;
use chrono::Utc;

use super::{Tool, ToolError};

/// Reports today's date (UTC) as `YYYY-MM-DD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTool;

#[async_trait]
impl Tool for DateTool {
    fn name(&self) -> &str {
        "current_date"
    }

    fn description(&self) -> &str {
        "Useful to find the current date. The input to this tool is an empty string. \
         The output of this tool is the current date as a string \
         in the following format: YYYY-mm-DD."
    }

    async fn execute(&self, _input: Option<&str>) -> Result<String, ToolError> {
        Ok(Utc::now().format("%Y-%m-%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_date_ignores_input_and_formats_iso_date() {
        let output = DateTool.execute(Some("what day is it?")).await.unwrap();

        assert_eq!(output.len(), 10);
        assert!(NaiveDate::parse_from_str(&output, "%Y-%m-%d").is_ok());
    }
}
