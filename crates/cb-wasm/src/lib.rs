//! WebAssembly bindings for the Safari content blocker converter

use cb_compiler::builder::CONVERTER_VERSION;
use cb_compiler::{ConversionJob, ConversionResult, ConvertOptions, Diagnostics, JobProgress, RuleSource};
use log::Level;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn version() -> String {
    CONVERTER_VERSION.to_string()
}

/// Convert an array of rule texts into content blocker JSON.
///
/// Returns `null` for `null`, `undefined` or an empty array.
#[wasm_bindgen]
pub fn json_from_filters(
    rules: JsValue,
    limit: u32,
    optimize: bool,
    advanced_blocking: bool,
) -> Result<JsValue, JsValue> {
    let Some(sources) = read_rules(&rules)? else {
        return Ok(JsValue::NULL);
    };

    let options = ConvertOptions {
        limit: limit as usize,
        optimize,
        advanced_blocking,
        chunk_size: 0,
    };
    let mut diagnostics = Diagnostics::new();
    let result = ConversionJob::new(sources, options).finish(&mut diagnostics);
    forward_diagnostics(&mut diagnostics);

    Ok(result.as_ref().map_or(JsValue::NULL, result_to_object))
}

/// Incremental conversion for hosts that must keep their event loop free.
///
/// Call [`ConversionTask::step`] until it returns `false`, then
/// [`ConversionTask::finish`].
#[wasm_bindgen]
pub struct ConversionTask {
    job: Option<ConversionJob>,
    diagnostics: Diagnostics,
}

#[wasm_bindgen]
impl ConversionTask {
    #[wasm_bindgen(constructor)]
    pub fn new(
        rules: JsValue,
        limit: u32,
        optimize: bool,
        advanced_blocking: bool,
        chunk_size: u32,
    ) -> Result<ConversionTask, JsValue> {
        let options = ConvertOptions {
            limit: limit as usize,
            optimize,
            advanced_blocking,
            chunk_size: chunk_size as usize,
        };
        let sources = read_rules(&rules)?.unwrap_or_default();
        Ok(Self {
            job: Some(ConversionJob::new(sources, options)),
            diagnostics: Diagnostics::new(),
        })
    }

    /// Process one slice. Returns `true` while work remains.
    pub fn step(&mut self) -> bool {
        let Some(job) = self.job.as_mut() else {
            return false;
        };
        let progress = job.step(&mut self.diagnostics);
        forward_diagnostics(&mut self.diagnostics);
        progress != JobProgress::Done
    }

    /// Assemble the result; `null` when there was nothing to convert.
    pub fn finish(&mut self) -> JsValue {
        let Some(job) = self.job.take() else {
            return JsValue::NULL;
        };
        let result = job.finish(&mut self.diagnostics);
        forward_diagnostics(&mut self.diagnostics);
        result.as_ref().map_or(JsValue::NULL, result_to_object)
    }
}

fn read_rules(rules: &JsValue) -> Result<Option<Vec<RuleSource>>, JsValue> {
    if rules.is_null() || rules.is_undefined() {
        return Ok(None);
    }
    if !js_sys::Array::is_array(rules) {
        return Err(JsValue::from_str("Rules must be an array of strings"));
    }

    let array = js_sys::Array::from(rules);
    if array.length() == 0 {
        return Ok(None);
    }

    array
        .iter()
        .map(|value| {
            value
                .as_string()
                .map(RuleSource::Text)
                .ok_or_else(|| JsValue::from_str("Rule must be a string"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn result_to_object(result: &ConversionResult) -> JsValue {
    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &js_result,
        &"totalConvertedCount".into(),
        &JsValue::from(result.total_converted_count as u32),
    );
    let _ = js_sys::Reflect::set(&js_result, &"convertedCount".into(), &JsValue::from(result.converted_count as u32));
    let _ = js_sys::Reflect::set(&js_result, &"errorsCount".into(), &JsValue::from(result.errors_count as u32));
    let _ = js_sys::Reflect::set(&js_result, &"overLimit".into(), &JsValue::from(result.over_limit));
    let _ = js_sys::Reflect::set(&js_result, &"converted".into(), &JsValue::from_str(&result.converted));

    if let Some(advanced) = &result.advanced_blocking {
        let _ = js_sys::Reflect::set(&js_result, &"advancedBlocking".into(), &JsValue::from_str(advanced));
    }
    if let Some(count) = result.advanced_blocking_converted_count {
        let _ = js_sys::Reflect::set(
            &js_result,
            &"advancedBlockingConvertedCount".into(),
            &JsValue::from(count as u32),
        );
    }

    let errors = js_sys::Array::new();
    for error in &result.errors {
        errors.push(&JsValue::from_str(error));
    }
    let _ = js_sys::Reflect::set(&js_result, &"errors".into(), &errors);

    js_result.into()
}

fn forward_diagnostics(diagnostics: &mut Diagnostics) {
    for entry in diagnostics.drain() {
        let message = JsValue::from_str(&entry.message);
        match entry.level {
            Level::Error => web_sys::console::error_1(&message),
            Level::Warn => web_sys::console::warn_1(&message),
            Level::Info => web_sys::console::info_1(&message),
            Level::Debug | Level::Trace => web_sys::console::debug_1(&message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    fn rules(texts: &[&str]) -> JsValue {
        let array = js_sys::Array::new();
        for text in texts {
            array.push(&JsValue::from_str(text));
        }
        array.into()
    }

    fn get(object: &JsValue, key: &str) -> JsValue {
        js_sys::Reflect::get(object, &key.into()).unwrap()
    }

    #[wasm_bindgen_test]
    fn null_for_missing_input() {
        assert!(json_from_filters(JsValue::NULL, 0, false, false).unwrap().is_null());
        assert!(json_from_filters(JsValue::UNDEFINED, 0, false, false).unwrap().is_null());
        assert!(json_from_filters(rules(&[]), 0, false, false).unwrap().is_null());
        assert!(json_from_filters(JsValue::from_str("||a.com^"), 0, false, false).is_err());
    }

    #[wasm_bindgen_test]
    fn converts_rules() {
        let result = json_from_filters(rules(&["||example.org^$image", "127.0.0.1$network"]), 0, false, true).unwrap();
        assert_eq!(get(&result, "convertedCount").as_f64(), Some(1.0));
        assert_eq!(get(&result, "errorsCount").as_f64(), Some(1.0));
        assert_eq!(get(&result, "overLimit").as_bool(), Some(false));
        assert_eq!(get(&result, "advancedBlockingConvertedCount").as_f64(), Some(0.0));

        let converted: serde_json::Value = serde_json::from_str(&get(&result, "converted").as_string().unwrap()).unwrap();
        assert_eq!(converted[0]["trigger"]["resource-type"], serde_json::json!(["image"]));
    }

    #[wasm_bindgen_test]
    fn limit_is_reported() {
        let result = json_from_filters(rules(&["||a.com^", "||b.com^"]), 1, false, false).unwrap();
        assert_eq!(get(&result, "totalConvertedCount").as_f64(), Some(2.0));
        assert_eq!(get(&result, "convertedCount").as_f64(), Some(1.0));
        assert_eq!(get(&result, "overLimit").as_bool(), Some(true));
        assert!(get(&result, "advancedBlocking").is_undefined());
    }

    #[wasm_bindgen_test]
    fn task_matches_one_shot_conversion() {
        let texts = ["##.banner", "example.org#@#.banner", "||ads.com^", "example.org#%#//scriptlet('a')"];
        let expected = json_from_filters(rules(&texts), 0, false, true).unwrap();

        let mut task = ConversionTask::new(rules(&texts), 0, false, true, 1).unwrap();
        let mut steps = 0;
        while task.step() {
            steps += 1;
        }
        assert!(steps >= texts.len());

        let result = task.finish();
        assert_eq!(get(&result, "converted").as_string(), get(&expected, "converted").as_string());
        assert_eq!(
            get(&result, "advancedBlocking").as_string(),
            get(&expected, "advancedBlocking").as_string()
        );
        assert!(task.finish().is_null());
    }
}
