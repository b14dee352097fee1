//! 参数 JSON Schema 生成（schemars）
//!
//! 子 schema 内联，生成的对象可直接作为 function 的 parameters 或结构化输出的 schema。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

pub fn json_schema_for<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.remove("definitions");
    }
    value
}
