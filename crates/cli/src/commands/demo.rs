use std::sync::Arc;

use platter_core::config::{AppConfig, LoadOptions};
use platter_core::domain::order::OrderTotals;
use platter_core::fixtures::{sample_catalog, sample_product, CATERING_BOX, WINGS};
use platter_core::{CartItem, ConfiguratorRuntime, ConfiguratorSession, ConfiguratorView, FlowType};
use platter_db::{open_order_service, BootstrapError};
use serde::Serialize;
use tracing::info;

use crate::commands::CommandResult;
use crate::DemoProduct;

/// One scripted customer action, applied before advancing to the next step.
#[derive(Clone, Copy, Debug)]
enum DemoAction {
    Variant(&'static str),
    Choose(&'static str, &'static str),
    Toggle(&'static str, &'static str),
    Quantity(&'static str, &'static str, i32),
    NoDip(&'static str),
    Advance,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    command: &'static str,
    status: &'static str,
    product: &'static str,
    view: ConfiguratorView,
    cart_item: CartItem,
    order_totals: OrderTotals,
}

fn script(product_key: &str) -> &'static [DemoAction] {
    use DemoAction::*;

    match product_key {
        WINGS => &[
            Variant("bone-in-12"),
            Advance,
            Choose("style", "tossed"),
            Advance,
            Toggle("sauces", "buffalo"),
            Toggle("sauces", "honey-bbq"),
            Advance,
            NoDip("dips"),
            Advance,
            Advance,
            Advance,
            Quantity("sides", "fries", 1),
            Advance,
        ],
        CATERING_BOX => &[
            Variant("box-10"),
            Advance,
            Choose("protein", "boneless"),
            Advance,
            Toggle("sauces", "garlic-parm"),
            Advance,
            Quantity("dips", "ranch", 2),
            Quantity("dips", "blue-cheese", 2),
            Advance,
        ],
        _ => &[],
    }
}

pub fn run(product: DemoProduct) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "demo",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let key = product.key();
    let Some(sample) = sample_product(key) else {
        return CommandResult::failure("demo", "unknown_product", format!("no sample `{key}`"), 3);
    };

    let runtime = Arc::new(ConfiguratorRuntime::with_catalog_markup(config.pricing.catalog_markup));
    let mut session = ConfiguratorSession::open(
        sample.product,
        sample.config,
        Arc::new(sample_catalog()),
        runtime,
    );

    for action in script(key) {
        if let Err(message) = apply(&mut session, *action) {
            return CommandResult::failure("demo", "configuration_rejected", message, 4);
        }
    }

    let cart_item = match session.add_to_cart() {
        Ok(item) => item,
        Err(error) => {
            return CommandResult::failure("demo", "incomplete_configuration", error.to_string(), 4);
        }
    };

    let async_runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "demo",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                5,
            );
        }
    };

    let order = async_runtime.block_on(async {
        let service = open_order_service(&config).await?;
        let order = service.add_cart_item(FlowType::OnlineOrder, cart_item.clone()).await;
        service.flush().await;
        Ok::<_, BootstrapError>(order)
    });
    let order = match order {
        Ok(order) => order,
        Err(error) => {
            return CommandResult::failure(
                "demo",
                "storage_unavailable",
                format!("could not open order storage: {error}"),
                5,
            );
        }
    };

    info!(
        event_name = "cli.demo.completed",
        product_id = key,
        item_total = %cart_item.price_breakdown.total,
        order_total = %order.totals.total,
        "demo configuration added to cart"
    );

    CommandResult::report(&DemoReport {
        command: "demo",
        status: "ok",
        product: key,
        view: session.view(),
        cart_item,
        order_totals: order.totals,
    })
}

fn apply(session: &mut ConfiguratorSession, action: DemoAction) -> Result<(), String> {
    let outcome = match action {
        DemoAction::Variant(variant_id) => session.select_variant(variant_id),
        DemoAction::Choose(step_id, option_id) => session.select_option(step_id, option_id),
        DemoAction::Toggle(step_id, option_id) => session.toggle_multi_choice(step_id, option_id),
        DemoAction::Quantity(step_id, item_id, delta) => {
            session.change_addon_quantity(step_id, item_id, delta)
        }
        DemoAction::NoDip(step_id) => session.select_no_dip(step_id),
        DemoAction::Advance => {
            let navigation = session.next();
            return match navigation.error {
                Some(error) if !navigation.advanced => Err(error),
                _ => Ok(()),
            };
        }
    };

    match outcome.error {
        Some(error) if !outcome.applied => Err(error),
        _ => Ok(()),
    }
}
