pub(crate) mod media_store;
pub(crate) mod script_generator;
pub(crate) mod speech;

pub(crate) use media_store::MediaStoreClient;
pub(crate) use script_generator::ScriptGeneratorClient;
pub(crate) use speech::SpeechClient;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// 上流が返すエラー本文をログ・エラーメッセージ向けに切り詰める。
/// LLM 系バックエンドは失敗時に巨大な本文を返すことがある。
pub(crate) fn truncate_error_body(body: &str) -> String {
    let char_count = body.chars().count();
    if char_count <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{truncated}... (truncated, {char_count} chars)")
}
