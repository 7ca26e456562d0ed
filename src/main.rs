use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use crossterm::cursor::MoveTo;
use crossterm::event::{DisableFocusChange, EnableFocusChange};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType};
use rust_decimal::Decimal;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use tablesync::api::{HttpApi, RestaurantApi};
use tablesync::cache::QueryData;
use tablesync::config::Config;
use tablesync::domain::inventory::low_stock;
use tablesync::domain::{DeliveryOrder, DeliveryStatus, Elapsed, Ingredient, Order, OrderLine, Table, TableAction, Urgency};
use tablesync::event::{Event, EventHandler};
use tablesync::resources::{active_deliveries, deliveries_with_status, kitchen_queue, tables_in_zone};
use tablesync::signals::spawn_connectivity_probe;
use tablesync::{logging, ClientOptions, LifecycleSignals, QueryClient, QueryHandle, QueryState, Resources};

#[derive(Parser, Debug)]
#[command(name = "tablesync")]
#[command(about = "Live view and actions over a restaurant backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tablesync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend url, overrides the config file
  #[arg(long)]
  url: Option<String>,

  /// Debug logging for this crate
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List tables
  Tables {
    /// Only tables whose name starts with this prefix
    #[arg(long)]
    zone: Option<String>,
  },
  /// Orders the kitchen is working on, oldest first
  Kitchen,
  /// Show a table's current order
  Order { table: i64 },
  /// Run an action on a table (occupy, confirm-order, send-to-kitchen, ...)
  Table {
    id: i64,
    action: TableAction,
    /// Order line as product:quantity, for confirm-order
    #[arg(long = "item", value_parser = parse_line)]
    items: Vec<OrderLine>,
  },
  /// List delivery orders
  Deliveries {
    #[arg(long)]
    status: Option<DeliveryStatus>,
    /// Hide delivered and cancelled orders
    #[arg(long)]
    active: bool,
  },
  /// Hand a pending delivery to the kitchen
  SendToKitchen { id: i64 },
  /// Move a delivery to another status
  DeliveryStatus { id: i64, status: DeliveryStatus },
  /// List ingredients
  Ingredients {
    /// Only ingredients at or below their threshold
    #[arg(long)]
    low: bool,
  },
  /// Set an ingredient's stock
  Stock { id: i64, value: Decimal },
  /// Keep a resource on screen, refreshing it like the POS screens do
  Watch { resource: WatchTarget },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WatchTarget {
  Tables,
  Kitchen,
  Deliveries,
  Ingredients,
}

fn parse_line(s: &str) -> Result<OrderLine, String> {
  let (product, quantity) = s
    .split_once(':')
    .ok_or_else(|| format!("expected product:quantity, got `{}`", s))?;
  let product_id = product
    .trim()
    .parse()
    .map_err(|_| format!("invalid product id `{}`", product))?;
  let quantity = quantity
    .trim()
    .parse()
    .map_err(|_| format!("invalid quantity `{}`", quantity))?;
  if quantity == 0 {
    return Err("quantity must be at least 1".to_string());
  }
  Ok(OrderLine::new(product_id, quantity))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.url {
    config.api.url = url;
  }

  let watching = matches!(args.command, Command::Watch { .. });
  let _log_guard = logging::init(&config.logging, args.verbose, watching)?;

  let api: Arc<dyn RestaurantApi> = Arc::new(HttpApi::new(&config.api, Config::get_api_token())?);
  let client = QueryClient::with_options(
    LifecycleSignals::new(),
    ClientOptions {
      serialize_mutations: config.mutations.serialize_per_key,
    },
  );
  let resources = Resources::new(client.clone(), api.clone(), config.resource_configs());

  match args.command {
    Command::Tables { zone } => {
      let tables = resources.tables.fetch().await?.data;
      let shown = match &zone {
        Some(prefix) => tables_in_zone(&tables, prefix),
        None => tables.iter().collect(),
      };
      print_lines(shown.into_iter().map(|table| table_line(table, now())));
    }
    Command::Kitchen => {
      let tables = resources.tables.fetch().await?.data;
      print_lines(kitchen_lines(&tables, now()));
    }
    Command::Order { table } => match resources.orders.fetch(table).await?.data {
      Some(order) => print_lines(order_lines(&order)),
      None => println!("Table {} has no open order", table),
    },
    Command::Table { id, action, items } => {
      resources.tables.fetch().await?;
      resources.tables.perform(id, action, &items).await?;
      if let Some(table) = resources.tables.cached().and_then(|t| t.into_iter().find(|t| t.id == id)) {
        println!("{}", table_line(&table, now()));
      }
    }
    Command::Deliveries { status, active } => {
      let deliveries = resources.deliveries.fetch().await?.data;
      let shown = match (status, active) {
        (Some(status), _) => deliveries_with_status(&deliveries, status),
        (None, true) => active_deliveries(&deliveries),
        (None, false) => deliveries.iter().collect(),
      };
      print_lines(shown.into_iter().map(|delivery| delivery_line(delivery, now())));
    }
    Command::SendToKitchen { id } => {
      resources.deliveries.fetch().await?;
      resources.deliveries.send_to_kitchen(id).await?;
      println!("Delivery #{} sent to kitchen", id);
    }
    Command::DeliveryStatus { id, status } => {
      resources.deliveries.fetch().await?;
      resources.deliveries.update_status(id, status).await?;
      println!("Delivery #{} is now {}", id, status);
    }
    Command::Ingredients { low } => {
      let ingredients = resources.inventory.fetch().await?.data;
      let shown = if low {
        low_stock(&ingredients)
      } else {
        ingredients.iter().collect()
      };
      print_lines(shown.into_iter().map(ingredient_line));
    }
    Command::Stock { id, value } => {
      resources.inventory.fetch().await?;
      resources.inventory.update_stock(id, value).await?;
      println!("Ingredient {} stock set to {}", id, value);
    }
    Command::Watch { resource } => {
      let probe_api = api.clone();
      let probe = spawn_connectivity_probe(
        client.signals().clone(),
        Duration::from_secs(config.api.probe_interval_secs.max(1)),
        move || {
          let api = probe_api.clone();
          async move { api.ping().await }
        },
      );
      let result = watch(resource, &resources, &client).await;
      probe.abort();
      result?;
    }
  }

  Ok(())
}

fn now() -> NaiveDateTime {
  chrono::Local::now().naive_local()
}

fn print_lines(lines: impl IntoIterator<Item = String>) {
  for line in lines {
    println!("{}", line);
  }
}

fn urgency_mark(urgency: Urgency) -> &'static str {
  match urgency {
    Urgency::Normal => "",
    Urgency::Warning => " !",
    Urgency::Danger => " !!",
  }
}

fn table_line(table: &Table, now: NaiveDateTime) -> String {
  let timer = if table.status.in_kitchen() {
    table.preparing_for(now).or_else(|| table.occupied_for(now))
  } else {
    table.occupied_for(now)
  };
  let timer = timer
    .map(|elapsed| format!("{}{}", elapsed, urgency_mark(elapsed.urgency())))
    .unwrap_or_default();
  format!(
    "{:>4}  {:<14} {:<18} {}",
    table.id,
    table.name,
    table.status.as_str(),
    timer
  )
  .trim_end()
  .to_string()
}

fn kitchen_lines(tables: &[Table], now: NaiveDateTime) -> Vec<String> {
  kitchen_queue(tables)
    .into_iter()
    .map(|table| table_line(table, now))
    .collect()
}

fn order_lines(order: &Order) -> Vec<String> {
  let mut lines = vec![format!(
    "Order #{} ({}) {}",
    order.id,
    order.table_name.as_deref().unwrap_or("-"),
    order.status
  )];
  lines.extend(order.items.iter().map(|item| {
    format!(
      "  {:>3} x {:<24} {:>8}",
      item.quantity, item.product_name, item.subtotal
    )
  }));
  lines.push(format!("  {} items, total {}", order.item_count(), order.total()));
  lines
}

fn delivery_line(delivery: &DeliveryOrder, now: NaiveDateTime) -> String {
  let waiting = delivery
    .created_at
    .filter(|_| !delivery.status.is_terminal())
    .map(|created| {
      let elapsed = Elapsed::between(created, now);
      format!("{}{}", elapsed, urgency_mark(elapsed.urgency()))
    })
    .unwrap_or_default();
  format!(
    "{:>4}  {:<10} {:<18} {:<28} {:>8} {}",
    delivery.id,
    delivery.status.as_str(),
    delivery.customer_name,
    delivery.address,
    delivery.total(),
    waiting
  )
  .trim_end()
  .to_string()
}

fn ingredient_line(ingredient: &Ingredient) -> String {
  format!(
    "{:>4}  {:<20} {:>8} {:<6} min {}{}",
    ingredient.id,
    ingredient.name,
    ingredient.stock,
    ingredient.unit,
    ingredient.low_stock_threshold,
    if ingredient.is_low_stock() { "  LOW" } else { "" }
  )
}

fn status_line<T>(title: &str, state: &QueryState<T>) -> String {
  let mut flags = Vec::new();
  if state.is_loading {
    flags.push("loading".to_string());
  }
  if state.is_stale {
    flags.push("stale".to_string());
  }
  if let Some(error) = &state.error {
    flags.push(format!("error: {}", error));
  }
  format!(
    "{} @ {}  {}  (q to quit)",
    title,
    now().format("%H:%M:%S"),
    flags.join(", ")
  )
}

async fn watch(target: WatchTarget, resources: &Resources, client: &QueryClient) -> Result<()> {
  terminal::enable_raw_mode().map_err(|e| eyre!("Failed to enter raw mode: {}", e))?;
  let result = match execute!(stdout(), EnableFocusChange) {
    Ok(()) => watch_target(target, resources, client).await,
    Err(e) => Err(e.into()),
  };

  // Restore the terminal before reporting anything
  let _ = execute!(stdout(), DisableFocusChange);
  let _ = terminal::disable_raw_mode();
  result
}

async fn watch_target(target: WatchTarget, resources: &Resources, client: &QueryClient) -> Result<()> {
  info!(?target, "Watching");

  match target {
    WatchTarget::Tables => {
      watch_query("tables", resources.tables.subscribe()?, client, |tables: &Vec<Table>| {
        let now = now();
        tables.iter().map(|table| table_line(table, now)).collect()
      })
      .await
    }
    WatchTarget::Kitchen => {
      watch_query("kitchen", resources.tables.subscribe()?, client, |tables: &Vec<Table>| {
        kitchen_lines(tables, now())
      })
      .await
    }
    WatchTarget::Deliveries => {
      watch_query(
        "deliveries",
        resources.deliveries.subscribe()?,
        client,
        |deliveries: &Vec<DeliveryOrder>| {
          let now = now();
          active_deliveries(deliveries)
            .into_iter()
            .map(|delivery| delivery_line(delivery, now))
            .collect()
        },
      )
      .await
    }
    WatchTarget::Ingredients => {
      watch_query(
        "ingredients",
        resources.inventory.subscribe()?,
        client,
        |ingredients: &Vec<Ingredient>| ingredients.iter().map(ingredient_line).collect(),
      )
      .await
    }
  }
}

async fn watch_query<T: QueryData>(
  title: &str,
  mut handle: QueryHandle<T>,
  client: &QueryClient,
  render: impl Fn(&T) -> Vec<String>,
) -> Result<()> {
  let mut events = EventHandler::new(Duration::from_millis(250));
  let mut state = handle.state();
  redraw(title, &state, &render)?;

  loop {
    tokio::select! {
      next = handle.changed() => {
        state = next;
        redraw(title, &state, &render)?;
      }
      event = events.next() => match event {
        Some(Event::FocusGained) => client.window_focused(),
        // Timers keep moving between fetches
        Some(Event::Tick) => redraw(title, &state, &render)?,
        Some(Event::Quit) | None => break,
      }
    }
  }

  Ok(())
}

fn redraw<T>(title: &str, state: &QueryState<T>, render: &impl Fn(&T) -> Vec<String>) -> Result<()> {
  let mut out = stdout();
  execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
  // Raw mode: lines need an explicit carriage return
  write!(out, "{}\r\n\r\n", status_line(title, state))?;
  match &state.data {
    Some(data) => {
      for line in render(data) {
        write!(out, "{}\r\n", line)?;
      }
    }
    None if state.is_loading => write!(out, "Loading...\r\n")?,
    None => write!(out, "No data\r\n")?,
  }
  out.flush()?;
  Ok(())
}
