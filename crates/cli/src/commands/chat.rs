use std::io::Write;

use agentcart_agent::{AgentRuntime, ChatMessage, MessageContent, Role};
use agentcart_core::commerce::cheapest;
use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::product::{Product, ProductId};
use agentcart_core::domain::shopper::Shopper;
use agentcart_core::domain::transaction::{ReceiptRecord, Transaction};
use agentcart_core::payment::CardFields;
use anyhow::Context;
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::bootstrap::build_services;
use crate::commands::{prepare, CommandContext, CommandResult, RuntimeKind};

const HELP: &str = "\
Type anything to talk to the shopping agent. Commands:
  /add <product-id>            add one unit from the last search results
  /qty <product-id> <n>        set a quantity (0 removes the line)
  /cart                        show the cart
  /history                     show past orders
  /checkout                    hand the cart to the payment agent
  /pay <number> <MM/YY> <cvc>  submit card details
  /cancel                      cancel the payment and keep shopping
  /retry                       retry a stalled checkout step
  /quit                        leave";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Say(String),
    Add(ProductId),
    Quantity { product_id: ProductId, quantity: i64 },
    Cart,
    History,
    Checkout,
    Pay(CardFields),
    Cancel,
    Retry,
    Help,
    Quit,
}

pub fn run(user: Option<String>, email: Option<String>) -> CommandResult {
    let CommandContext { config, runtime } = match prepare("chat", RuntimeKind::MultiThread) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let shopper = match user {
        Some(uid) => Shopper::registered(uid, email),
        None => Shopper::guest(format!("guest-{}", Uuid::new_v4())),
    };

    runtime.block_on(async {
        let services = match build_services(&config, &shopper).await {
            Ok(services) => services,
            Err(error) => {
                return CommandResult::failure(
                    "chat",
                    error.error_class(),
                    error.to_string(),
                    error.exit_code(),
                );
            }
        };
        let agent = match AgentRuntime::start(services.deps, services.settings, shopper).await {
            Ok(agent) => agent,
            Err(error) => {
                return CommandResult::failure("chat", "session_start", error.to_string(), 4);
            }
        };

        let outcome = repl(agent).await;
        if let Some(pool) = services.db_pool {
            pool.close().await;
        }
        match outcome {
            Ok(()) => CommandResult::success("chat", "session ended"),
            Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), 5),
        }
    })
}

async fn repl(mut agent: AgentRuntime) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    for message in agent.transcript() {
        writeln!(stdout, "{}", render_message(message))?;
    }
    writeln!(stdout, "(type /help for commands)")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let messages = match parse_line(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(ReplCommand::Help) => {
                writeln!(stdout, "{HELP}")?;
                continue;
            }
            Ok(ReplCommand::Cart) => {
                writeln!(stdout, "{}", render_cart(agent.cart(), agent.cart_total()))?;
                continue;
            }
            Ok(ReplCommand::History) => {
                writeln!(stdout, "{}", render_history(agent.transactions()))?;
                continue;
            }
            Ok(ReplCommand::Say(text)) => agent.handle_user_input(&text).await,
            Ok(ReplCommand::Add(product_id)) => agent.quick_add(&product_id).await,
            Ok(ReplCommand::Quantity { product_id, quantity }) => {
                agent.set_quantity(&product_id, quantity).await
            }
            Ok(ReplCommand::Checkout) => agent.start_checkout().await,
            Ok(ReplCommand::Pay(card)) => agent.submit_payment(card).await,
            Ok(ReplCommand::Cancel) => agent.cancel_payment().await,
            Ok(ReplCommand::Retry) => agent.retry().await,
            Err(usage) => {
                writeln!(stdout, "{usage}")?;
                continue;
            }
        };

        for message in messages.iter().filter(|message| message.role != Role::User) {
            writeln!(stdout, "{}", render_message(message))?;
        }
    }
    Ok(())
}

pub fn parse_line(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ReplCommand::Say(line.to_string()));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match (name.as_str(), args.as_slice()) {
        ("add", [product_id]) => Ok(ReplCommand::Add(ProductId((*product_id).to_string()))),
        ("add", _) => Err("usage: /add <product-id>".to_string()),
        ("qty", [product_id, quantity]) => quantity
            .parse::<i64>()
            .map(|quantity| ReplCommand::Quantity {
                product_id: ProductId((*product_id).to_string()),
                quantity,
            })
            .map_err(|_| format!("`{quantity}` is not a whole number")),
        ("qty", _) => Err("usage: /qty <product-id> <n>".to_string()),
        ("pay", [number @ .., expiry, cvc]) if !number.is_empty() => {
            Ok(ReplCommand::Pay(CardFields::new(number.join(" "), *expiry, *cvc)))
        }
        ("pay", _) => Err("usage: /pay <number> <MM/YY> <cvc>".to_string()),
        ("cart", []) => Ok(ReplCommand::Cart),
        ("history", []) => Ok(ReplCommand::History),
        ("checkout", []) => Ok(ReplCommand::Checkout),
        ("cancel", []) => Ok(ReplCommand::Cancel),
        ("retry", []) => Ok(ReplCommand::Retry),
        ("help", _) => Ok(ReplCommand::Help),
        ("quit" | "exit", _) => Ok(ReplCommand::Quit),
        (other, _) => Err(format!("unknown command `/{other}`; type /help")),
    }
}

pub fn render_message(message: &ChatMessage) -> String {
    let speaker = match message.role {
        Role::User => "you",
        Role::ShoppingAgent => "shopping",
        Role::PaymentAgent => "payment",
        Role::System => "system",
    };
    match &message.content {
        MessageContent::Text(text) => format!("[{speaker}] {text}"),
        MessageContent::SearchResults(products) => {
            format!("[{speaker}] {}", render_search_results(products))
        }
        MessageContent::Receipt(receipt) => format!("[{speaker}] {}", render_receipt(receipt)),
    }
}

fn render_search_results(products: &[Product]) -> String {
    if products.is_empty() {
        return "No matching products.".to_string();
    }
    let mut lines = vec![format!("Found {} product(s):", products.len())];
    for product in products {
        let offers = product
            .suppliers
            .iter()
            .map(|supplier| format!("{} ${:.2}", supplier.name, supplier.price))
            .collect::<Vec<_>>()
            .join(", ");
        let best = cheapest(&product.suppliers)
            .map(|supplier| format!(" (best: {})", supplier.name))
            .unwrap_or_default();
        lines.push(format!("  {}  {}: {offers}{best}", product.id.as_str(), product.name));
    }
    lines.join("\n")
}

fn render_receipt(receipt: &ReceiptRecord) -> String {
    format!(
        "Receipt for {}: total ${:.2}, transaction {}\n  NFT: {}\n  Explorer: {}",
        receipt.order_summary,
        receipt.total,
        receipt.transaction_id.as_str(),
        receipt.nft_url,
        receipt.explorer_url
    )
}

pub fn render_cart(items: &[CartItem], total: Option<Decimal>) -> String {
    if items.is_empty() {
        return "Your cart is empty.".to_string();
    }
    let mut lines: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "  {}  {} x{} @ ${:.2} from {}",
                item.id.as_str(),
                item.name,
                item.quantity,
                item.price,
                item.supplier
            )
        })
        .collect();
    lines.push(match total {
        Some(total) => format!("  total: ${total:.2}"),
        None => "  total: too large to display".to_string(),
    });
    lines.join("\n")
}

pub fn render_history(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No past orders.".to_string();
    }
    transactions
        .iter()
        .rev()
        .map(|transaction| {
            format!(
                "  {}  {}  ${:.2}  {} item(s)",
                transaction.timestamp.format("%Y-%m-%d %H:%M"),
                transaction.id.as_str(),
                transaction.total,
                transaction.products.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use agentcart_agent::{ChatMessage, MessageContent, Role};
    use agentcart_core::commerce::{CatalogLookup, StaticCatalog};
    use agentcart_core::domain::cart::CartItem;
    use agentcart_core::domain::product::ProductId;
    use agentcart_core::payment::CardFields;
    use rust_decimal::Decimal;

    use super::{parse_line, render_cart, render_history, render_message, ReplCommand};

    #[test]
    fn plain_text_goes_to_the_agent() {
        assert_eq!(
            parse_line("  find me a laptop "),
            Ok(ReplCommand::Say("find me a laptop".to_string()))
        );
    }

    #[test]
    fn slash_commands_parse_their_arguments() {
        assert_eq!(
            parse_line("/add prod_ps5"),
            Ok(ReplCommand::Add(ProductId("prod_ps5".to_string())))
        );
        assert_eq!(
            parse_line("/qty prod_ps5 3"),
            Ok(ReplCommand::Quantity { product_id: ProductId("prod_ps5".to_string()), quantity: 3 })
        );
        assert_eq!(
            parse_line("/pay 4242 4242 4242 4242 12/30 123"),
            Ok(ReplCommand::Pay(CardFields::new("4242 4242 4242 4242", "12/30", "123")))
        );
        assert_eq!(parse_line("/QUIT"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn malformed_commands_return_usage() {
        assert!(parse_line("/qty prod_ps5 lots").is_err());
        assert!(parse_line("/pay 12/30 123").is_err());
        assert!(parse_line("/add").is_err());
        assert!(parse_line("/teleport").is_err());
    }

    #[test]
    fn search_results_list_every_supplier_and_the_best_one() {
        let products = StaticCatalog::demo().search("macbook air");
        let rendered =
            render_message(&ChatMessage::new(Role::ShoppingAgent, MessageContent::SearchResults(products)));
        assert!(rendered.contains("e-Retailer $999.00"));
        assert!(rendered.contains("(best: DirectSource)"));
    }

    #[test]
    fn cart_and_history_render_empty_states() {
        assert_eq!(render_cart(&[], Some(Decimal::ZERO)), "Your cart is empty.");
        assert_eq!(render_history(&[]), "No past orders.");

        let item = CartItem {
            id: ProductId("prod_ps5".to_string()),
            name: "PlayStation 5 Console".to_string(),
            price: Decimal::from(499),
            image: String::new(),
            quantity: 2,
            supplier: "GameStop".to_string(),
        };
        let rendered = render_cart(&[item], Some(Decimal::from(998)));
        assert!(rendered.contains("x2 @ $499.00 from GameStop"));
        assert!(rendered.ends_with("total: $998.00"));
    }
}
