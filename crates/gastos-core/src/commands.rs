//! Command router: maps `/start`, `/add`, `/list` and `/chart` to handlers.
//!
//! Handlers never fail the update. Bad input gets a corrective reply, remote
//! failures are logged with their detail and answered with a fixed message.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    chart::{ChartFile, ChartRenderer, CHART_TITLE},
    domain::{ChatId, ExpenseRecord},
    formatting::{format_expense_line, format_money, split_text_chunks},
    messaging::{port::MessagingPort, types::ChatAction},
    ports::ExpenseSheet,
    Result,
};

pub const START_MESSAGE: &str = "Olá! Use /add <valor> <descrição> para adicionar uma despesa.\n\
/list mostra as despesas registradas e /chart envia o gráfico de gastos.";
pub const ADD_USAGE: &str = "Uso: /add <valor> <descrição>";
pub const AMOUNT_NOT_POSITIVE: &str = "O valor deve ser positivo.";
pub const EMPTY_DESCRIPTION: &str = "A descrição não pode estar vazia.";
pub const ADD_FAILED: &str = "Erro ao adicionar despesa.";
pub const NO_EXPENSES: &str = "Nenhuma despesa registrada.";
pub const LIST_HEADER: &str = "Despesas registradas:";
pub const LIST_FAILED: &str = "Erro ao listar despesas.";
pub const CHART_FAILED: &str = "Erro ao gerar gráfico.";

/// Commands shown in the Telegram menu, `(name, description)`.
pub const COMMAND_MENU: &[(&str, &str)] = &[
    ("start", "Mostra como usar o bot"),
    ("add", "Adiciona uma despesa: /add <valor> <descrição>"),
    ("list", "Lista as despesas registradas"),
    ("chart", "Envia o gráfico de gastos"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Add,
    List,
    Chart,
    Unknown(String),
}

impl Command {
    pub fn parse(name: &str) -> Self {
        match name {
            "start" | "help" => Command::Start,
            "add" => Command::Add,
            "list" => Command::List,
            "chart" => Command::Chart,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// A `/cmd@botname arg1 ...` message split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandText {
    /// Lowercased command name without the slash.
    pub name: String,
    /// The `@botname` suffix, if any.
    pub addressee: Option<String>,
    pub args: String,
}

impl CommandText {
    /// Whether this command is meant for the bot whose username is `me`.
    ///
    /// Commands without a suffix are for every bot in the chat. A suffixed
    /// command is only ours when our username is known and matches.
    pub fn is_for(&self, me: Option<&str>) -> bool {
        match (&self.addressee, me) {
            (None, _) => true,
            (Some(to), Some(me)) => to.eq_ignore_ascii_case(me.trim_start_matches('@')),
            (Some(_), None) => false,
        }
    }
}

pub fn parse_command(text: &str) -> Option<CommandText> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim_start_matches('/');
    let args = parts.next().unwrap_or("").trim().to_string();

    let (name, addressee) = match first.split_once('@') {
        Some((name, to)) => (name, Some(to.to_string()).filter(|t| !t.is_empty())),
        None => (first, None),
    };

    Some(CommandText {
        name: name.to_lowercase(),
        addressee,
        args,
    })
}

/// Why an `/add` was refused before touching the sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddRejection {
    Usage,
    NotPositive,
    EmptyDescription,
}

impl AddRejection {
    pub fn message(self) -> &'static str {
        match self {
            AddRejection::Usage => ADD_USAGE,
            AddRejection::NotPositive => AMOUNT_NOT_POSITIVE,
            AddRejection::EmptyDescription => EMPTY_DESCRIPTION,
        }
    }
}

/// Validate `/add` arguments: `<amount> <description...>`.
///
/// The description is the remaining words joined by single spaces.
pub fn validate_add(args: &str) -> std::result::Result<ExpenseRecord, AddRejection> {
    let mut words = args.split_whitespace();
    let amount = words
        .next()
        .and_then(|w| w.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or(AddRejection::Usage)?;
    let description = words.collect::<Vec<_>>().join(" ");

    if amount <= 0.0 {
        return Err(AddRejection::NotPositive);
    }
    if description.trim().is_empty() {
        return Err(AddRejection::EmptyDescription);
    }

    Ok(ExpenseRecord {
        amount,
        description,
    })
}

pub struct ExpenseBot {
    sheet: Arc<dyn ExpenseSheet>,
    messenger: Arc<dyn MessagingPort>,
    charts: ChartRenderer,
    username: Option<String>,
}

impl ExpenseBot {
    pub fn new(
        sheet: Arc<dyn ExpenseSheet>,
        messenger: Arc<dyn MessagingPort>,
        charts: ChartRenderer,
    ) -> Self {
        Self {
            sheet,
            messenger,
            charts,
            username: None,
        }
    }

    /// The bot's own username, used to skip `/cmd@otherbot` in group chats.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Route one incoming text message. Only fails if the reply cannot be sent.
    pub async fn dispatch(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let Some(cmd) = parse_command(text) else {
            debug!(chat_id = chat_id.0, "ignoring non-command message");
            return Ok(());
        };
        if !cmd.is_for(self.username.as_deref()) {
            debug!(
                chat_id = chat_id.0,
                addressee = ?cmd.addressee,
                "ignoring command addressed to another bot"
            );
            return Ok(());
        }

        match Command::parse(&cmd.name) {
            Command::Start => self.send_text(chat_id, START_MESSAGE).await,
            Command::Add => {
                let reply = self.add(&cmd.args).await;
                self.send_text(chat_id, &reply).await
            }
            Command::List => {
                self.chat_action(chat_id, ChatAction::Typing).await;
                let reply = self.list().await;
                self.send_text(chat_id, &reply).await
            }
            Command::Chart => self.chart(chat_id).await,
            Command::Unknown(other) => {
                debug!(chat_id = chat_id.0, command = %other, "ignoring unknown command");
                Ok(())
            }
        }
    }

    pub async fn add(&self, args: &str) -> String {
        let expense = match validate_add(args) {
            Ok(e) => e,
            Err(rejection) => return rejection.message().to_string(),
        };

        match self
            .sheet
            .append_row(expense.amount, &expense.description)
            .await
        {
            Ok(()) => {
                info!(amount = expense.amount, "expense recorded");
                format!(
                    "Despesa de {} para \"{}\" adicionada.",
                    format_money(expense.amount),
                    expense.description
                )
            }
            Err(e) => {
                error!("failed to add expense: {e}");
                ADD_FAILED.to_string()
            }
        }
    }

    pub async fn list(&self) -> String {
        match self.render_list().await {
            Ok(text) => text,
            Err(e) => {
                error!("failed to list expenses: {e}");
                LIST_FAILED.to_string()
            }
        }
    }

    async fn render_list(&self) -> Result<String> {
        let rows = self.sheet.read_all_rows().await?;
        if rows.len() < 2 {
            return Ok(NO_EXPENSES.to_string());
        }

        let mut out = format!("{LIST_HEADER}\n");
        for row in &rows[1..] {
            let rec = ExpenseRecord::from_row(row)?;
            out.push_str(&format_expense_line(rec.amount, &rec.description));
            out.push('\n');
        }
        Ok(out)
    }

    async fn chart(&self, chat_id: ChatId) -> Result<()> {
        let chart = match self.render_chart().await {
            Ok(c) => c,
            Err(e) => {
                error!("failed to generate chart: {e}");
                return self.send_text(chat_id, CHART_FAILED).await;
            }
        };

        self.chat_action(chat_id, ChatAction::UploadPhoto).await;
        let sent = self
            .messenger
            .send_photo(chat_id, chart.path(), Some(CHART_TITLE))
            .await;

        let path = chart.path().display().to_string();
        if let Err(e) = chart.remove() {
            warn!(path = %path, "failed to remove chart file: {e}");
        }

        if let Err(e) = sent {
            error!("failed to send chart: {e}");
            return self.send_text(chat_id, CHART_FAILED).await;
        }
        Ok(())
    }

    async fn render_chart(&self) -> Result<ChartFile> {
        let records = self.sheet.read_all_records().await?;
        let path = self.charts.next_path();
        self.charts.generate(&records, &path)
    }

    /// Best-effort activity indicator; skipped when the messenger has none.
    async fn chat_action(&self, chat_id: ChatId, action: ChatAction) {
        if !self.messenger.capabilities().supports_chat_actions {
            return;
        }
        if let Err(e) = self.messenger.send_chat_action(chat_id, action).await {
            debug!(chat_id = chat_id.0, "chat action failed: {e}");
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let limit = self.messenger.capabilities().max_message_len;
        for chunk in split_text_chunks(text, limit) {
            self.messenger.send_text(chat_id, &chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{errors::Error, messaging::types::MessagingCapabilities};

    const CHAT: ChatId = ChatId(42);

    #[derive(Default)]
    struct FakeSheet {
        rows: Mutex<Vec<Vec<String>>>,
        appends: Mutex<usize>,
        fail: bool,
    }

    impl FakeSheet {
        fn with_header() -> Self {
            Self::with_rows(&[&["Valor", "Descrição"]])
        }

        fn with_rows(rows: &[&[&str]]) -> Self {
            let rows = rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect();
            Self {
                rows: Mutex::new(rows),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::with_header()
            }
        }

        fn appends(&self) -> usize {
            *self.appends.lock().unwrap()
        }
    }

    #[async_trait]
    impl ExpenseSheet for FakeSheet {
        async fn append_row(&self, amount: f64, description: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Auth("invalid_grant".to_string()));
            }
            *self.appends.lock().unwrap() += 1;
            self.rows
                .lock()
                .unwrap()
                .push(vec![amount.to_string(), description.to_string()]);
            Ok(())
        }

        async fn read_all_rows(&self) -> Result<Vec<Vec<String>>> {
            if self.fail {
                return Err(Error::NotFound("botgastos".to_string()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        texts: Mutex<Vec<String>>,
        photos: Mutex<Vec<(PathBuf, Vec<u8>)>>,
        actions: Mutex<Vec<ChatAction>>,
        max_len: Option<usize>,
        fail_photos: bool,
        no_chat_actions: bool,
    }

    impl FakeMessenger {
        fn texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }

        fn photos(&self) -> Vec<(PathBuf, Vec<u8>)> {
            self.photos.lock().unwrap().clone()
        }

        fn actions(&self) -> Vec<ChatAction> {
            self.actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_chat_actions: !self.no_chat_actions,
                max_message_len: self.max_len.unwrap_or(4096),
            }
        }

        async fn send_text(&self, _chat_id: ChatId, text: &str) -> Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_photo(
            &self,
            _chat_id: ChatId,
            path: &Path,
            _caption: Option<&str>,
        ) -> Result<()> {
            if self.fail_photos {
                return Err(Error::External("telegram error: timeout".to_string()));
            }
            let bytes = std::fs::read(path)?;
            self.photos.lock().unwrap().push((path.to_path_buf(), bytes));
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, action: ChatAction) -> Result<()> {
            self.actions.lock().unwrap().push(action);
            Ok(())
        }
    }

    fn bot(sheet: Arc<FakeSheet>, messenger: Arc<FakeMessenger>) -> ExpenseBot {
        let dir = std::env::temp_dir().join(format!("gastos-commands-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        ExpenseBot::new(sheet, messenger, ChartRenderer::new(dir)).with_username("gastos_bot")
    }

    #[test]
    fn parses_commands_with_bot_suffix() {
        assert_eq!(
            parse_command("/add@gastos_bot 10 Almoço"),
            Some(CommandText {
                name: "add".to_string(),
                addressee: Some("gastos_bot".to_string()),
                args: "10 Almoço".to_string(),
            })
        );
        assert_eq!(
            parse_command("  /LIST  "),
            Some(CommandText {
                name: "list".to_string(),
                addressee: None,
                args: String::new(),
            })
        );
        assert_eq!(parse_command("/chart@").and_then(|c| c.addressee), None);
        assert_eq!(parse_command("hello"), None);
        assert_eq!(Command::parse("help"), Command::Start);
        assert_eq!(Command::parse("nope"), Command::Unknown("nope".to_string()));
    }

    #[test]
    fn addressed_commands_match_own_username_only() {
        let ours = parse_command("/add@Gastos_Bot 5 x").unwrap();
        let theirs = parse_command("/add@some_other_bot 5 x").unwrap();
        let plain = parse_command("/add 5 x").unwrap();

        assert!(ours.is_for(Some("gastos_bot")));
        assert!(!theirs.is_for(Some("gastos_bot")));
        assert!(plain.is_for(Some("gastos_bot")));
        assert!(plain.is_for(None));
        assert!(!ours.is_for(None));
    }

    #[tokio::test]
    async fn commands_for_other_bots_are_ignored() {
        let sheet = Arc::new(FakeSheet::with_header());
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(sheet.clone(), messenger.clone());

        bot.dispatch(CHAT, "/add@some_other_bot 5 x").await.unwrap();
        bot.dispatch(CHAT, "/start@some_other_bot").await.unwrap();
        assert_eq!(sheet.appends(), 0);
        assert!(messenger.texts().is_empty());

        bot.dispatch(CHAT, "/add@gastos_bot 5 x").await.unwrap();
        assert_eq!(sheet.appends(), 1);
    }

    #[test]
    fn validates_add_arguments() {
        assert_eq!(
            validate_add("12.5 Almoço  no centro"),
            Ok(ExpenseRecord {
                amount: 12.5,
                description: "Almoço no centro".to_string()
            })
        );
        assert_eq!(validate_add(""), Err(AddRejection::Usage));
        assert_eq!(validate_add("abc x"), Err(AddRejection::Usage));
        assert_eq!(validate_add("NaN x"), Err(AddRejection::Usage));
        assert_eq!(validate_add("-5 x"), Err(AddRejection::NotPositive));
        assert_eq!(validate_add("0 x"), Err(AddRejection::NotPositive));
        assert_eq!(validate_add("5"), Err(AddRejection::EmptyDescription));
        assert_eq!(validate_add("5    "), Err(AddRejection::EmptyDescription));
    }

    #[tokio::test]
    async fn rejected_adds_never_touch_the_sheet() {
        let sheet = Arc::new(FakeSheet::with_header());
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(sheet.clone(), messenger.clone());

        for cmd in ["/add -5 x", "/add 0 x", "/add 5", "/add 5    ", "/add abc x", "/add"] {
            bot.dispatch(CHAT, cmd).await.unwrap();
        }

        assert_eq!(sheet.appends(), 0);
        assert_eq!(
            messenger.texts(),
            vec![
                AMOUNT_NOT_POSITIVE,
                AMOUNT_NOT_POSITIVE,
                EMPTY_DESCRIPTION,
                EMPTY_DESCRIPTION,
                ADD_USAGE,
                ADD_USAGE
            ]
        );
    }

    #[tokio::test]
    async fn add_then_list_shows_the_expense() {
        let sheet = Arc::new(FakeSheet::with_header());
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(sheet.clone(), messenger.clone());

        bot.dispatch(CHAT, "/add 12.5 Almoço").await.unwrap();
        bot.dispatch(CHAT, "/list").await.unwrap();

        let texts = messenger.texts();
        assert_eq!(texts[0], "Despesa de R$12.50 para \"Almoço\" adicionada.");
        assert_eq!(texts[1], "Despesas registradas:\nR$12.50 - Almoço\n");
        assert_eq!(sheet.appends(), 1);
    }

    #[tokio::test]
    async fn add_failure_is_reported_generically() {
        let sheet = Arc::new(FakeSheet::failing());
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(sheet, messenger.clone());

        bot.dispatch(CHAT, "/add 10 Food").await.unwrap();
        assert_eq!(messenger.texts(), vec![ADD_FAILED]);
    }

    #[tokio::test]
    async fn list_on_header_only_sheet() {
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(Arc::new(FakeSheet::with_header()), messenger.clone());
        bot.dispatch(CHAT, "/list").await.unwrap();

        let messenger2 = Arc::new(FakeMessenger::default());
        let empty = bot_with_rows(&[], messenger2.clone());
        empty.dispatch(CHAT, "/list").await.unwrap();

        assert_eq!(messenger.texts(), vec![NO_EXPENSES]);
        assert_eq!(messenger2.texts(), vec![NO_EXPENSES]);
    }

    fn bot_with_rows(rows: &[&[&str]], messenger: Arc<FakeMessenger>) -> ExpenseBot {
        bot(Arc::new(FakeSheet::with_rows(rows)), messenger)
    }

    #[tokio::test]
    async fn list_tolerates_comma_decimals() {
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot_with_rows(
            &[&["Valor", "Descrição"], &["15,50", "Mercado"]],
            messenger.clone(),
        );
        bot.dispatch(CHAT, "/list").await.unwrap();
        assert_eq!(
            messenger.texts(),
            vec!["Despesas registradas:\nR$15.50 - Mercado\n"]
        );
    }

    #[tokio::test]
    async fn list_with_malformed_amount_fails_generically() {
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot_with_rows(
            &[&["Valor", "Descrição"], &["10", "Ok"], &["dez", "Bad"]],
            messenger.clone(),
        );
        bot.dispatch(CHAT, "/list").await.unwrap();
        assert_eq!(messenger.texts(), vec![LIST_FAILED]);
    }

    #[tokio::test]
    async fn long_lists_are_split_across_messages() {
        let sheet = Arc::new(FakeSheet::with_header());
        let messenger = Arc::new(FakeMessenger {
            max_len: Some(64),
            ..Default::default()
        });
        let bot = bot(sheet, messenger.clone());

        for i in 1..=10 {
            bot.add(&format!("{i} item número {i}")).await;
        }
        bot.dispatch(CHAT, "/list").await.unwrap();

        let texts = messenger.texts();
        assert!(texts.len() > 1);
        assert!(texts.iter().all(|t| t.len() <= 64));
        assert!(texts.concat().contains("R$10.00 - item número 10"));
    }

    #[tokio::test]
    async fn chat_actions_follow_messenger_capabilities() {
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(Arc::new(FakeSheet::with_header()), messenger.clone());
        bot.dispatch(CHAT, "/list").await.unwrap();
        assert_eq!(messenger.actions(), vec![ChatAction::Typing]);

        let quiet = Arc::new(FakeMessenger {
            no_chat_actions: true,
            ..Default::default()
        });
        let bot = bot_with_rows(&[&["Valor", "Descrição"], &["10", "Food"]], quiet.clone());
        bot.dispatch(CHAT, "/list").await.unwrap();
        bot.dispatch(CHAT, "/chart").await.unwrap();
        assert!(quiet.actions().is_empty());
        assert_eq!(quiet.photos().len(), 1);
    }

    #[tokio::test]
    async fn chart_on_empty_sheet_sends_no_image() {
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(Arc::new(FakeSheet::with_header()), messenger.clone());

        bot.dispatch(CHAT, "/chart").await.unwrap();

        assert!(messenger.photos().is_empty());
        assert_eq!(messenger.texts(), vec![CHART_FAILED]);
    }

    #[tokio::test]
    async fn chart_is_sent_then_removed() {
        let sheet = Arc::new(FakeSheet::with_header());
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(sheet, messenger.clone());

        bot.dispatch(CHAT, "/add 10 Food").await.unwrap();
        bot.dispatch(CHAT, "/add 20 Transport").await.unwrap();
        bot.dispatch(CHAT, "/chart").await.unwrap();

        let photos = messenger.photos();
        assert_eq!(photos.len(), 1);
        let (path, bytes) = &photos[0];
        assert!(bytes.starts_with(b"\x89PNG"));
        assert!(!path.exists());
        assert_eq!(messenger.actions(), vec![ChatAction::UploadPhoto]);
    }

    #[tokio::test]
    async fn failed_upload_still_removes_the_chart() {
        let dir = std::env::temp_dir().join(format!("gastos-upload-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let messenger = Arc::new(FakeMessenger {
            fail_photos: true,
            ..Default::default()
        });
        let sheet = Arc::new(FakeSheet::with_rows(&[
            &["Valor", "Descrição"],
            &["10", "Food"],
        ]));
        let bot = ExpenseBot::new(sheet, messenger.clone(), ChartRenderer::new(&dir));

        bot.dispatch(CHAT, "/chart").await.unwrap();

        assert_eq!(messenger.texts(), vec![CHART_FAILED]);
        let leftovers = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".png"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn start_and_unknown_commands() {
        let messenger = Arc::new(FakeMessenger::default());
        let bot = bot(Arc::new(FakeSheet::with_header()), messenger.clone());

        bot.dispatch(CHAT, "/start").await.unwrap();
        bot.dispatch(CHAT, "/unknown").await.unwrap();
        bot.dispatch(CHAT, "just text").await.unwrap();

        assert_eq!(messenger.texts(), vec![START_MESSAGE]);
    }
}
