//! End-to-end cleaning pipeline scenarios.

use chunkscribe::cleaning::CleaningPipeline;
use chunkscribe::config::Language;
use chunkscribe::ModelId;

fn run_whisper(text: &str) -> String {
    CleaningPipeline::for_model(ModelId::Whisper)
        .unwrap()
        .run(text, Language::Japanese, None)
        .final_text
}

fn run_gpt(text: &str) -> String {
    CleaningPipeline::for_model(ModelId::Gpt4o)
        .unwrap()
        .run(text, Language::Japanese, None)
        .final_text
}

#[test]
fn tail_loop_collapses_to_single_closing() {
    let body = "本日は録音環境についての長い説明を行いました。次回は実際の編集作業に入ります。";
    let text = format!("{body}{}", "ありがとうございます。".repeat(20));
    let cleaned = run_whisper(&text);

    assert!(cleaned.starts_with(body));
    assert_eq!(cleaned.matches("ありがとうございます。").count(), 1);
    assert!(cleaned.ends_with("ありがとうございます。"));
}

#[test]
fn prompt_contamination_removed() {
    let cleaned = run_gpt("<前回終了箇所>前回の内容</前回終了箇所>こんにちは。これは本文です。");
    assert_eq!(cleaned, "こんにちは。これは本文です。");
}

#[test]
fn enumeration_repeat_keeps_one_cycle() {
    let cleaned = run_whisper("A、B、C、A、B、C、A、B、C。");
    assert_eq!(cleaned, "A、B、C。");
}

#[test]
fn zero_length_text_stays_empty_with_no_issues() {
    for model in ModelId::ALL {
        let pipeline = CleaningPipeline::for_model(model).unwrap();
        let result = pipeline.run("", Language::Japanese, None);
        assert_eq!(result.final_text, "");
        assert_eq!(result.issues().count(), 0);
    }
}

#[test]
fn pipeline_is_idempotent() {
    let inputs = [
        format!(
            "今日の会議の内容をまとめます。{}",
            "ご視聴ありがとうございました。".repeat(6)
        ),
        "A、B、C、A、B、C、A、B、C。".to_string(),
        "<前回終了箇所>文脈</前回終了箇所>通常の本文がここにあります。".to_string(),
        "繰り返しのない普通の文章です。次の文も普通です。".to_string(),
    ];

    for input in inputs {
        let whisper_once = run_whisper(&input);
        assert_eq!(
            run_whisper(&whisper_once),
            whisper_once,
            "whisper pipeline not idempotent for {input:?}"
        );

        let gpt_once = run_gpt(&input);
        assert_eq!(
            run_gpt(&gpt_once),
            gpt_once,
            "gpt pipeline not idempotent for {input:?}"
        );
    }
}

#[test]
fn validator_reports_but_never_mutates() {
    // Broken text with a replacement char: issues are reported, and the
    // pipeline stops at the validator without changing the transcript.
    let text = "この文字起こしには\u{FFFD}壊れた文字が含まれています。";
    let pipeline = CleaningPipeline::for_model(ModelId::Whisper).unwrap();
    let result = pipeline.run(text, Language::Japanese, None);

    assert_eq!(result.final_text, text);
    assert!(result.issues().count() > 0);
}

#[test]
fn legitimate_content_survives_whisper_pipeline() {
    let text = "第一章では基礎理論を扱いました。第二章では応用例を見ていきます。\
                質問がある場合は最後にまとめて受け付けます。それでは始めましょう。";
    assert_eq!(run_whisper(text), text);
}
