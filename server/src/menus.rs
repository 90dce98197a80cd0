//! The menus every session navigates.

use rust_decimal::Decimal;
use std::fmt::Write;

use crate::menu::{Choice, MenuCatalog, MenuContext};
use crate::world::{Organism, OrganismId};

pub const MAIN: &str = "main";
pub const ORGANISMS: &str = "organisms";
pub const ORGANISM: &str = "organism";

/// Every key the default menus load. Checked at startup.
pub const MENU_KEYS: &[&str] = &[MAIN, ORGANISMS, ORGANISM];

pub fn default_catalog() -> MenuCatalog {
    let mut catalog = MenuCatalog::new();
    catalog.define(MAIN, build_main);
    catalog.define(ORGANISMS, build_organisms);
    catalog.define(ORGANISM, build_organism);
    catalog
}

fn build_main(choices: &mut Vec<Choice>, ctx: &mut MenuContext<'_>) {
    ctx.print("What would you like to do?\n");
    choices.push(Choice::new("Look into the tank", look_into_tank));
    choices.push(Choice::new("Inspect organisms", |ctx| ctx.load(ORGANISMS)));
    choices.push(Choice::new("Drop food", drop_food));
    choices.push(Choice::new("Who is here?", who_is_here));
}

fn build_organisms(choices: &mut Vec<Choice>, ctx: &mut MenuContext<'_>) {
    if ctx.world().organism_count() == 0 {
        ctx.print("The tank is empty.\n");
    } else {
        ctx.print("Which organism?\n");
    }

    for organism in ctx.world().organisms() {
        let id = organism.id;
        choices.push(Choice::new(describe(organism), move |ctx| {
            ctx.set_focus(Some(id));
            ctx.load(ORGANISM);
        }));
    }
    choices.push(Choice::new("Back", |ctx| ctx.load(MAIN)));
}

fn build_organism(choices: &mut Vec<Choice>, ctx: &mut MenuContext<'_>) {
    let text = match ctx.focus() {
        None => "No organism is selected.\n".to_string(),
        Some(id) => match ctx.world().organism(id) {
            Ok(organism) => format!("Organism {}\n", describe(organism)),
            Err(e) => format!("That organism is gone: {}.\n", e),
        },
    };
    ctx.print(text);

    choices.push(Choice::new("Split", split_focus));
    choices.push(Choice::new("Food claimed by this organism", claimed_food));
    choices.push(Choice::new("Back", |ctx| ctx.load(ORGANISMS)));
}

/// Masses are shown to two places.
fn amount(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn describe(organism: &Organism) -> String {
    format!(
        "{}: mass {}, saturation {:.0}, {}",
        organism.id,
        amount(organism.mass),
        organism.saturation().round_dp(0),
        organism.activity
    )
}

fn look_into_tank(ctx: &mut MenuContext<'_>) {
    let world = ctx.world();
    let mut text = format!(
        "The tank holds {} organisms ({}) and {} food items ({}); {} of {} used.\n",
        world.organism_count(),
        amount(world.total_organism_mass()),
        world.food_count(),
        amount(world.total_food_mass()),
        amount(world.total_mass()),
        amount(world.config().tank_ceiling),
    );
    for organism in world.organisms() {
        let _ = writeln!(text, "  {}", describe(organism));
    }
    for (food, predator) in world.food_with_predators() {
        let claim = match (food.predator, predator) {
            (None, _) => "unclaimed".to_string(),
            (Some(_), Some(organism)) => format!("claimed by {}", organism.id),
            (Some(id), None) => format!("claimed by {} (gone)", id),
        };
        let _ = writeln!(text, "  {}: {}, {}", food.id, amount(food.mass), claim);
    }
    ctx.print(text);
}

fn drop_food(ctx: &mut MenuContext<'_>) {
    let spawn = ctx.world_mut().spawn_food();
    if spawn.food.is_some() {
        let name = ctx.name().to_string();
        ctx.broadcast(format!(
            "{} dropped {} food into the tank.\n",
            name,
            amount(spawn.mass)
        ));
    } else {
        ctx.print("The tank is full; nothing was dropped.\n");
    }
}

fn who_is_here(ctx: &mut MenuContext<'_>) {
    let text = format!("Here now: {}.\n", ctx.roster().join(", "));
    ctx.print(text);
}

fn focused(ctx: &mut MenuContext<'_>) -> Option<OrganismId> {
    let focus = ctx.focus();
    if focus.is_none() {
        ctx.print("No organism is selected.\n");
    }
    focus
}

fn split_focus(ctx: &mut MenuContext<'_>) {
    let Some(id) = focused(ctx) else {
        return;
    };

    match ctx.world_mut().split_organism(id) {
        Ok(sibling) => {
            let name = ctx.name().to_string();
            ctx.broadcast(format!("{} split organism {}, making {}.\n", name, id, sibling));
            ctx.load(ORGANISM);
        }
        Err(e) => ctx.print(format!("Cannot split: {}.\n", e)),
    }
}

fn claimed_food(ctx: &mut MenuContext<'_>) {
    let Some(id) = focused(ctx) else {
        return;
    };

    let text = {
        let claimed = ctx.world().food_claimed_by(id);
        if claimed.is_empty() {
            format!("No food is claimed by {}.\n", id)
        } else {
            let mut text = format!("Food claimed by {}:\n", id);
            for food in claimed {
                let _ = writeln!(text, "  {}: {}", food.id, amount(food.mass));
            }
            text
        }
    };
    ctx.print(text);
}
