use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::clients::ScriptGeneratorClient;
use crate::clients::script_generator::ScriptPrompt;
use crate::store::models::{PodcastPreferences, UserRecord};

/// 生成されたスクリプトの出所。フォールバック率の監視と API レスポンスに使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScriptSource {
    Generated,
    Fallback,
}

impl ScriptSource {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptOutcome {
    pub(crate) text: String,
    pub(crate) source: ScriptSource,
}

/// 台本作成ステージ。失敗時もエピソード全体は止めない契約なので
/// 実装はフォールバック台本を返してよい。
#[async_trait]
pub(crate) trait ScriptStage: Send + Sync {
    async fn compose(&self, user: &UserRecord) -> Result<ScriptOutcome>;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TopMover {
    pub(crate) name: String,
    pub(crate) change_pct: f64,
}

/// 台本に織り込む週次マーケットスナップショット。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MarketSnapshot {
    pub(crate) top_movers: Vec<TopMover>,
    pub(crate) active_traders: u32,
    pub(crate) items_sold: u32,
    pub(crate) highlight: String,
}

pub(crate) trait MarketDataSource: Send + Sync {
    fn snapshot(&self) -> MarketSnapshot;
}

/// 固定の参照データを返すソース。ライブの集計基盤に接続するまでのプレースホルダ。
pub(crate) struct StaticMarketData;

impl MarketDataSource for StaticMarketData {
    fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            top_movers: vec![
                TopMover {
                    name: "AAPL".to_string(),
                    change_pct: 2.3,
                },
                TopMover {
                    name: "TSLA".to_string(),
                    change_pct: 3.1,
                },
            ],
            active_traders: 1250,
            items_sold: 480,
            highlight: "Top member portfolio returned 12.5% with 85.2% call accuracy".to_string(),
        }
    }
}

/// どのバックエンドにも到達できないときに使う固定台本。番組の骨子
/// (挨拶、マーケット概況、コミュニティ報告、学びのコーナー、締め) は維持する。
pub(crate) const FALLBACK_SCRIPT: &str = "Welcome back to Marketplace Weekly, your personal \
update from the trading floor. If you're hearing this, you've made it through another week in \
the markets, and there is plenty to talk about.\n\
\n\
First, the big picture. Markets spent the week grinding higher, with technology once again \
doing the heavy lifting. The broad indexes closed up between two and three percent, and the \
names this community watches most closely moved right along with them.\n\
\n\
Now for the part I enjoy most: what this community got up to. More than a thousand active \
traders compared notes this week, and the top of the leaderboard posted double-digit returns \
with the kind of call accuracy that would make a professional desk jealous. When that many \
people look at the same data and reach similar conclusions, that is not luck. That is \
collective intelligence doing its job.\n\
\n\
Here is one thing worth taking away from the week. The strongest results did not come from \
chasing momentum. They came from positions sized sensibly and exits taken on plan. Write your \
exit before you enter. It is the oldest advice in the book because it keeps working.\n\
\n\
That is your update for this week. Keep your watchlist short, your notes honest, and your \
stop-losses closer than your convictions. This has been Marketplace Weekly. I'll see you on \
the trading floor.";

/// チャット補完バックエンドで台本を生成するステージ。バックエンドの失敗は
/// フォールバック台本で吸収し、エラーとしては伝播させない。
pub(crate) struct LlmScriptStage {
    client: Arc<ScriptGeneratorClient>,
    market_data: Arc<dyn MarketDataSource>,
}

impl LlmScriptStage {
    pub(crate) fn new(
        client: Arc<ScriptGeneratorClient>,
        market_data: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self {
            client,
            market_data,
        }
    }
}

#[async_trait]
impl ScriptStage for LlmScriptStage {
    async fn compose(&self, user: &UserRecord) -> Result<ScriptOutcome> {
        let snapshot = self.market_data.snapshot();
        let prompt = ScriptPrompt {
            system: system_prompt(&user.preferences.preferred_length),
            user: user_prompt(user, &snapshot),
        };

        match self.client.generate_script(&prompt).await {
            Ok(text) => Ok(ScriptOutcome {
                text,
                source: ScriptSource::Generated,
            }),
            Err(error) => {
                warn!(
                    user_id = %user.id,
                    error = ?error,
                    "script generation failed, substituting the canned weekly script"
                );
                Ok(ScriptOutcome {
                    text: FALLBACK_SCRIPT.to_string(),
                    source: ScriptSource::Fallback,
                })
            }
        }
    }
}

fn system_prompt(preferred_length: &str) -> String {
    format!(
        "You are the host of \"Marketplace Weekly\", a personalized weekly audio update for \
         members of an online trading community. Your delivery is conversational, energetic, \
         and radio-ready: short sentences, everyday language, and numbers explained like you \
         are talking to a friend.\n\
         \n\
         Structure every episode in this order: a personal greeting and week overview, market \
         highlights with community context, one insight or trend worth learning from, and a \
         sign-off with an actionable takeaway.\n\
         \n\
         Write for the ear, not the page. No headings, no bullet points, no stage directions. \
         Target a spoken length of {preferred_length}."
    )
}

fn user_prompt(user: &UserRecord, snapshot: &MarketSnapshot) -> String {
    let history = if user.last_generation().is_some() {
        "returning listener with previous episodes"
    } else {
        "first-time listener"
    };

    format!(
        "Create this week's episode for the listener below.\n\
         \n\
         Listener profile:\n\
         - Name: {name}\n\
         - Content preferences: {preferences}\n\
         - Preferred episode length: {length}\n\
         - History: {history}\n\
         \n\
         This week's market snapshot:\n\
         - Top movers: {movers}\n\
         - Community activity: {traders} active traders, {sold} items sold\n\
         - Highlight: {highlight}\n\
         \n\
         Use the actual numbers from the snapshot, address the listener by name, and keep the \
         tone personal and specific.",
        name = listener_name(&user.email),
        preferences = preference_summary(&user.preferences),
        length = user.preferences.preferred_length,
        movers = movers_summary(&snapshot.top_movers),
        traders = snapshot.active_traders,
        sold = snapshot.items_sold,
        highlight = snapshot.highlight,
    )
}

fn listener_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn preference_summary(preferences: &PodcastPreferences) -> String {
    let mut enabled = Vec::new();
    if preferences.include_market_analysis {
        enabled.push("market analysis");
    }
    if preferences.include_community_highlights {
        enabled.push("community highlights");
    }
    if preferences.include_educational_content {
        enabled.push("educational content");
    }
    if preferences.include_personalized_insights {
        enabled.push("personalized insights");
    }
    if enabled.is_empty() {
        "none".to_string()
    } else {
        enabled.join(", ")
    }
}

fn movers_summary(movers: &[TopMover]) -> String {
    if movers.is_empty() {
        return "no standout movers this week".to_string();
    }
    movers
        .iter()
        .map(|mover| format!("{} ({:+.1}%)", mover.name, mover.change_pct))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::clients::ScriptGeneratorClient;

    fn listener(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            preferences: PodcastPreferences::default(),
            preferred_voice_id: None,
            last_generated_at: None,
            last_episode_url: None,
        }
    }

    fn stage_for(server_uri: &str) -> LlmScriptStage {
        let client = Arc::new(ScriptGeneratorClient::new_for_test(server_uri));
        LlmScriptStage::new(client, Arc::new(StaticMarketData))
    }

    #[test]
    fn system_prompt_carries_persona_and_length() {
        let prompt = system_prompt("3 minutes");
        assert!(prompt.contains("Marketplace Weekly"));
        assert!(prompt.contains("spoken length of 3 minutes"));
    }

    #[test]
    fn user_prompt_embeds_listener_and_snapshot() {
        let user = listener("alex.chen@example.com");
        let snapshot = StaticMarketData.snapshot();
        let prompt = user_prompt(&user, &snapshot);

        assert!(prompt.contains("Name: alex.chen"));
        assert!(prompt.contains("first-time listener"));
        assert!(prompt.contains("AAPL (+2.3%), TSLA (+3.1%)"));
        assert!(prompt.contains("1250 active traders, 480 items sold"));
        assert!(prompt.contains("85.2% call accuracy"));
    }

    #[test]
    fn user_prompt_marks_returning_listeners() {
        let mut user = listener("jess@example.com");
        user.last_generated_at = Some(Utc::now());
        let prompt = user_prompt(&user, &StaticMarketData.snapshot());
        assert!(prompt.contains("returning listener"));
    }

    #[test]
    fn preference_summary_lists_enabled_flags_only() {
        let preferences = PodcastPreferences {
            include_educational_content: false,
            ..PodcastPreferences::default()
        };
        let summary = preference_summary(&preferences);
        assert!(summary.contains("market analysis"));
        assert!(!summary.contains("educational content"));
    }

    #[test]
    fn preference_summary_handles_everything_disabled() {
        let preferences = PodcastPreferences {
            include_market_analysis: false,
            include_community_highlights: false,
            include_educational_content: false,
            include_personalized_insights: false,
            preferred_length: "5 minutes".to_string(),
        };
        assert_eq!(preference_summary(&preferences), "none");
    }

    #[tokio::test]
    async fn compose_returns_generated_script_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Hey Alex, what a week it has been."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = stage_for(&server.uri())
            .compose(&listener("alex@example.com"))
            .await
            .expect("compose succeeds");

        assert_eq!(outcome.source, ScriptSource::Generated);
        assert_eq!(outcome.text, "Hey Alex, what a week it has been.");
    }

    #[tokio::test]
    async fn compose_falls_back_when_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = stage_for(&server.uri())
            .compose(&listener("alex@example.com"))
            .await
            .expect("fallback still succeeds");

        assert_eq!(outcome.source, ScriptSource::Fallback);
        assert_eq!(outcome.text, FALLBACK_SCRIPT);
    }

    #[tokio::test]
    async fn compose_falls_back_when_response_has_no_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let outcome = stage_for(&server.uri())
            .compose(&listener("alex@example.com"))
            .await
            .expect("fallback still succeeds");

        assert_eq!(outcome.source, ScriptSource::Fallback);
        assert_eq!(outcome.text, FALLBACK_SCRIPT);
    }
}
