//! `coffee`: serves a random coffee to a nick.

use rand::seq::SliceRandom;

use crate::error::PluginError;
use crate::plugins::{Plugin, PluginSender};
use crate::storage::ModuleDescriptor;

pub const COFFEE_TYPES: &[&str] = &[
    "Espresso",
    "Cappuccino",
    "Latte",
    "Mocha",
    "Americano",
    "Macchiato",
    "Flat White",
    "Irish Coffee",
    "Turkish Coffee",
    "Vienna Coffee",
    "Cortado",
    "Ristretto",
    "Doppio",
    "Lungo",
    "Affogato",
];

pub struct Coffee {
    sender: PluginSender,
}

pub fn construct(_descriptor: &ModuleDescriptor, sender: PluginSender) -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(Coffee { sender }))
}

impl Plugin for Coffee {
    fn handle_command(&mut self, command: &str, args: &[String], channel: &str, user: &str) -> Result<(), PluginError> {
        let Some(target) = args.first() else {
            return self
                .sender
                .send(channel, &format!("{user}: Usage: !{command} <nick>"));
        };
        let kind = COFFEE_TYPES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("Espresso");
        self.sender.send(channel, &format!("brews a hot {kind} for {target}!"))
    }
}
