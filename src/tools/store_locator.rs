//! Store branch lookup by city.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use super::ToolSpec;

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "find_nearby_stores",
        description: "Find the addresses of store branches in a specific city. \
                      The input must be a city name in Vietnam, for example \
                      \"Hà Nội\" or \"Hồ Chí Minh\".",
        input_schema: json!({
            "type": "object",
            "properties": {
                "city": { "type": "string", "description": "City name" }
            },
            "required": ["city"]
        }),
    }
}

#[derive(Debug, Deserialize)]
struct StoreFile {
    #[serde(default)]
    stores: Vec<Store>,
}

#[derive(Debug, Deserialize)]
struct Store {
    #[serde(default)]
    city: String,
    address: String,
}

pub fn run(stores_path: &Path, city: &str) -> String {
    let contents = match std::fs::read_to_string(stores_path) {
        Ok(contents) => contents,
        Err(_) => return "Lỗi: Không tìm thấy file dữ liệu cửa hàng.".to_string(),
    };
    let data: StoreFile = match serde_json::from_str(&contents) {
        Ok(data) => data,
        Err(_) => return "Lỗi: File dữ liệu cửa hàng bị hỏng.".to_string(),
    };

    let city_normalized = city.trim().to_lowercase();
    let found: Vec<&Store> = data
        .stores
        .iter()
        .filter(|store| store.city.to_lowercase().contains(&city_normalized))
        .collect();

    if found.is_empty() {
        return format!("Rất tiếc, không tìm thấy cửa hàng nào ở '{}'.", city);
    }

    let mut response = format!("Tìm thấy {} cửa hàng ở {}:\n", found.len(), city);
    for store in found {
        response.push_str(&format!("- {}\n", store.address));
    }
    response
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn stores_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn finds_stores_by_city_substring() {
        let file = stores_file(
            r#"{"stores": [
                {"city": "Hà Nội", "address": "12 Thái Hà"},
                {"city": "Hồ Chí Minh", "address": "45 Lê Lợi"}
            ]}"#,
        );

        let result = run(file.path(), "hà nội");
        assert!(result.contains("Tìm thấy 1 cửa hàng"));
        assert!(result.contains("12 Thái Hà"));
    }

    #[test]
    fn unknown_city_is_reported_politely() {
        let file = stores_file(r#"{"stores": []}"#);
        let result = run(file.path(), "Đà Nẵng");
        assert!(result.contains("không tìm thấy cửa hàng nào ở 'Đà Nẵng'"));
    }

    #[test]
    fn missing_file_and_corrupt_file_return_error_messages() {
        let missing = run(Path::new("/nonexistent/stores.json"), "Hà Nội");
        assert!(missing.contains("Không tìm thấy file"));

        let corrupt = stores_file("not json");
        assert!(run(corrupt.path(), "Hà Nội").contains("bị hỏng"));
    }
}
