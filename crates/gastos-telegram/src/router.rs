use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use gastos_core::{
    chart::ChartRenderer,
    commands::{ExpenseBot, COMMAND_MENU},
    config::Config,
    messaging::port::MessagingPort,
    ports::ExpenseSheet,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub expenses: Arc<ExpenseBot>,
}

pub async fn run_polling(cfg: Arc<Config>, sheet: Arc<dyn ExpenseSheet>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Without our username, commands addressed as /cmd@bot are skipped.
    let username = match bot.get_me().await {
        Ok(me) => {
            let username = me.user.username.clone();
            info!("gastos started: @{}", username.as_deref().unwrap_or("?"));
            username
        }
        Err(e) => {
            warn!("getMe failed: {e}");
            None
        }
    };
    info!("Chart directory: {}", cfg.temp_dir.display());

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        warn!("failed to register command menu: {e}");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        cfg.telegram_message_limit,
    ));
    let mut expenses = ExpenseBot::new(
        sheet,
        messenger,
        ChartRenderer::new(cfg.temp_dir.clone()),
    );
    if let Some(name) = username {
        expenses = expenses.with_username(name);
    }

    let state = Arc::new(AppState {
        expenses: Arc::new(expenses),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn bot_commands() -> Vec<BotCommand> {
    COMMAND_MENU
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect()
}
