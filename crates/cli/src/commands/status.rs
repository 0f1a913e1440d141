//! Server status via service-info

use colored::Colorize;
use htsprobe_harness::ErrorLayer;
use serde::Serialize;

use super::Context;
use crate::output::{print_error, print_item, print_success, print_value, TableDisplay};

#[derive(Serialize)]
struct ServiceInfoDisplay {
    id: String,
    name: String,
    version: String,
    htsget_version: String,
    datatype: String,
    formats: String,
}

impl ServiceInfoDisplay {
    fn from_json(info: &serde_json::Value) -> Self {
        let field = |pointer: &str| match info.pointer(pointer) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            Some(v) => v.to_string(),
            None => "-".to_string(),
        };
        Self {
            id: field("/id"),
            name: field("/name"),
            version: field("/version"),
            htsget_version: field("/htsget/version"),
            datatype: field("/htsget/datatype"),
            formats: field("/htsget/formats"),
        }
    }
}

impl TableDisplay for ServiceInfoDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Version", "htsget", "Datatype", "Formats"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.version.clone(),
            self.htsget_version.clone(),
            self.datatype.clone(),
            self.formats.clone(),
        ]
    }
}

pub async fn execute(ctx: &Context) -> anyhow::Result<()> {
    let base_url = ctx.base_url();
    let client = ctx.client()?;

    let info = match client.service_info().await {
        Ok(info) => info,
        Err(e) => {
            let layer = if e.is_unreachable() {
                ErrorLayer::Server
            } else {
                ErrorLayer::Query
            };
            print_error(&format!("[{}] server not healthy at {}: {}", layer, base_url, e));
            std::process::exit(1);
        }
    };

    if !ctx.format.is_human() {
        return print_value(&info, ctx.format);
    }

    print_success(&format!("Server is running at {}", base_url.cyan()));
    print_item(&ServiceInfoDisplay::from_json(&info), ctx.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_info_fields() {
        let info = serde_json::json!({
            "id": "htsgetr",
            "name": "htsget server",
            "htsget": {
                "version": "1.3.0",
                "datatype": "reads",
                "formats": ["BAM", "CRAM"]
            }
        });
        let display = ServiceInfoDisplay::from_json(&info);
        assert_eq!(display.id, "htsgetr");
        assert_eq!(display.version, "-");
        assert_eq!(display.htsget_version, "1.3.0");
        assert_eq!(display.formats, "BAM, CRAM");
    }
}
