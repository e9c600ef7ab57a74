use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password};
use std::sync::Arc;

use expense_client::auth::{
    AuthSession, RegisterRequest, SessionHandle, SqliteTokenStore, TokenStore,
};
use expense_client::config::{Command, Config};
use expense_client::http_client::{ApiClient, ReqwestTransport};
use expense_client::middleware::session_stages;
use expense_client::models::{Expense, ExpenseCreate};
use expense_client::routes::{guard, Guard, Navigator, Route, Router};
use expense_client::views::ask::{AskAi, SUGGESTED_QUESTIONS};
use expense_client::views::{load_dashboard, save_error_message, ExpenseApi, ExpenseListView};

const LOGIN_FALLBACK: &str = "Invalid username or password.";
const REGISTER_FALLBACK: &str = "Registration failed. Please try again.";

/// Everything a command needs, wired once at startup
struct App {
    session: AuthSession,
    expenses: Arc<ExpenseApi>,
    client: Arc<ApiClient>,
    router: Arc<Router>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("API base URL: {}", config.api_url);

    let app = build_app(&config)?;
    app.session.bootstrap().await;

    if command.requires_auth() {
        let target = route_for(&command);
        match guard(&app.session.state(), target) {
            Guard::Render(_) => {}
            Guard::Redirect(Route::Login) => {
                anyhow::bail!("Not logged in. Run `expense-client login` first.")
            }
            other => anyhow::bail!("Unexpected navigation state: {:?}", other),
        }
    }

    let result = run(&app, command).await;

    if app.router.current() == Route::Login {
        eprintln!("Your session has expired. Run `expense-client login` to continue.");
    }

    result
}

fn build_app(config: &Config) -> Result<App> {
    let store: Arc<dyn TokenStore> = Arc::new(
        SqliteTokenStore::open(&config.session_db).context("Failed to open session database")?,
    );
    let router = Arc::new(Router::default());
    let transport = Arc::new(
        ReqwestTransport::new(&config.api_url, config.connect_timeout)
            .context("Failed to create HTTP transport")?,
    );

    let navigator: Arc<dyn Navigator> = router.clone();
    let handle = SessionHandle::new();
    let client = Arc::new(ApiClient::new(
        transport,
        session_stages(store.clone(), navigator, Arc::new(handle.clone())),
    ));
    let session = AuthSession::new(client.clone(), store, handle);
    let expenses = Arc::new(ExpenseApi::new(client.clone()));

    Ok(App {
        session,
        expenses,
        client,
        router,
    })
}

fn route_for(command: &Command) -> Route {
    match command {
        Command::Login { .. } => Route::Login,
        Command::Register { .. } => Route::Register,
        Command::List { .. } | Command::Delete { .. } | Command::Categories => Route::Expenses,
        Command::Add { .. } => Route::NewExpense,
        Command::Edit { id, .. } | Command::Show { id } => Route::EditExpense(*id),
        Command::Ask { .. } => Route::AskAi,
        Command::Logout | Command::Whoami | Command::Dashboard => Route::Dashboard,
    }
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            if app.session.is_authenticated() {
                println!("Already logged in. Run `expense-client logout` first.");
                return Ok(());
            }
            let username = match username {
                Some(u) => u,
                None => Input::new()
                    .with_prompt("Username")
                    .interact_text()
                    .context("Failed to read username")?,
            };
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Password")
                    .interact()
                    .context("Failed to read password")?,
            };

            match app.session.login(&username, &password).await {
                Ok(user) => println!("Welcome back, {}!", user.display_name()),
                Err(e) => anyhow::bail!(e.user_message(LOGIN_FALLBACK)),
            }
        }

        Command::Register {
            username,
            email,
            password,
            password_confirm,
        } => {
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Password")
                    .interact()
                    .context("Failed to read password")?,
            };
            let password_confirm = match password_confirm {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Confirm password")
                    .interact()
                    .context("Failed to read password confirmation")?,
            };

            let request = RegisterRequest {
                username,
                email,
                password,
                password_confirm,
            };
            match app.session.register(&request).await {
                Ok(user) => println!("Account created. Logged in as {}.", user.username),
                Err(e) => anyhow::bail!(e.user_message(REGISTER_FALLBACK)),
            }
        }

        Command::Logout => {
            app.session.logout().await;
            println!("Logged out.");
        }

        Command::Whoami => {
            let Some(user) = app.session.user() else {
                anyhow::bail!("Not logged in. Run `expense-client login` first.");
            };
            println!("{} <{}>", user.display_name(), user.email);
            println!("  username:    {}", user.username);
            println!("  member since {}", user.date_joined.format("%Y-%m-%d"));
        }

        Command::Dashboard => {
            let summary = load_dashboard(&app.expenses)
                .await
                .context("Failed to load dashboard")?;

            println!("Total (recent): ${:.2}", summary.total);
            println!("Categories:     {}", summary.categories.len());
            println!();
            println!("By category:");
            for (name, amount) in &summary.by_category {
                println!("  {:<20} ${:>10.2}", name, amount);
            }
            println!();
            println!("Recent expenses:");
            for expense in &summary.recent {
                print_expense_row(expense);
            }
        }

        Command::List { page, category } => {
            let view = ExpenseListView::new(app.expenses.clone());
            view.set_category(category);
            view.set_page(page);
            view.load().await.context("Failed to load expenses")?;

            let state = view.snapshot();
            if state.expenses.is_empty() {
                println!("No expenses found. Add your first expense!");
            }
            for expense in &state.expenses {
                print_expense_row(expense);
            }
            println!();
            println!(
                "Page {} · {} expense(s){}{}",
                state.page,
                state.total_count,
                if state.has_prev { " · --page to go back" } else { "" },
                if state.has_next { " · more available" } else { "" },
            );
        }

        Command::Show { id } => {
            let expense = app
                .expenses
                .get(id)
                .await
                .context("Failed to load expense")?;
            print_expense_detail(&expense);
        }

        Command::Add {
            amount,
            description,
            date,
            notes,
            category,
        } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let data = ExpenseCreate::new(amount, description, date)
                .with_notes(notes)
                .with_category(category);
            match app.expenses.save(None, &data).await {
                Ok(expense) => {
                    println!("Saved expense #{}.", expense.id);
                    print_expense_detail(&expense);
                }
                Err(e) => anyhow::bail!(save_error_message(&e)),
            }
        }

        Command::Edit {
            id,
            amount,
            description,
            date,
            notes,
            category,
        } => {
            let date = match date {
                Some(date) => date,
                None => app
                    .expenses
                    .get(id)
                    .await
                    .context("Failed to load expense")?
                    .date,
            };
            let data = ExpenseCreate::new(amount, description, date)
                .with_notes(notes)
                .with_category(category);
            match app.expenses.save(Some(id), &data).await {
                Ok(expense) => {
                    println!("Updated expense #{}.", expense.id);
                    print_expense_detail(&expense);
                }
                Err(e) => anyhow::bail!(save_error_message(&e)),
            }
        }

        Command::Delete { id, yes } => {
            let confirmed = yes
                || Confirm::new()
                    .with_prompt("Are you sure you want to delete this expense?")
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
            if !confirmed {
                return Ok(());
            }
            app.expenses
                .delete(id)
                .await
                .context("Failed to delete expense")?;
            println!("Deleted expense #{}.", id);
        }

        Command::Categories => {
            let categories = app
                .expenses
                .categories()
                .await
                .context("Failed to load categories")?;
            for category in categories {
                println!("{:>4}  {:<20} {}", category.id, category.name, category.description);
            }
        }

        Command::Ask { question } => {
            let ai = AskAi::new(app.client.clone());
            if !question.is_empty() {
                if let Some(reply) = ai.ask(&question.join(" ")).await {
                    println!("{}", reply.content);
                }
                return Ok(());
            }

            println!("Ask me anything about your expenses. Empty line to quit.");
            println!("Try asking:");
            for q in SUGGESTED_QUESTIONS {
                println!("  - {}", q);
            }
            loop {
                let line: String = Input::new()
                    .with_prompt("you")
                    .allow_empty(true)
                    .interact_text()
                    .context("Failed to read question")?;
                if line.trim().is_empty() {
                    break;
                }
                if let Some(reply) = ai.ask(&line).await {
                    println!("ai: {}", reply.content);
                }
                if app.router.current() == Route::Login {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_expense_row(expense: &Expense) {
    println!(
        "{:>5}  {}  {:<30} {:<16} ${:>9.2}",
        expense.id,
        expense.date,
        expense.description,
        expense.category_label(),
        expense.amount_value()
    );
}

fn print_expense_detail(expense: &Expense) {
    println!("#{} {}", expense.id, expense.description);
    println!("  amount:   ${:.2}", expense.amount_value());
    println!("  date:     {}", expense.date);
    println!("  category: {}", expense.category_label());
    if !expense.notes.is_empty() {
        println!("  notes:    {}", expense.notes);
    }
    if let Some(hint) = expense.ai_hint() {
        println!("  {}", hint);
    }
}
