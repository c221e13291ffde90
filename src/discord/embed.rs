use serenity::all::{
    ButtonStyle, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponseMessage, CreateSelectMenu, CreateSelectMenuKind,
    CreateSelectMenuOption, ReactionType,
};

use super::interactions::{
    BACK_TO_LIST_ID, MANAGE_SELECT_ID, REMOVE_SUBSCRIPTION_PREFIX,
};
use crate::db::Subscription;
use crate::engine::AdminDenial;
use crate::engine::router::JOINED_GLYPH;

pub const BLURPLE: u32 = 0x5865F2;
pub const GREEN: u32 = 0x57F287;
/// Discord rejects select menus with more options than this.
pub const SELECT_OPTION_LIMIT: usize = 25;
pub const BUTTONS_PER_ROW: usize = 5;
/// Discord rejects embeds with more fields than this.
pub const EMBED_FIELD_LIMIT: usize = 25;
/// Four full button rows; the fifth and last allowed row holds the back button.
pub const REMOVE_BUTTON_LIMIT: usize = 20;

pub const NO_CHANNEL_SELECTED: &str = "❌ No channel selected";
pub const INVALID_BUTTON: &str = "❌ Invalid button data";
pub const GUILD_ONLY: &str = "❌ This command can only be used in a server";
pub const NO_VOICE_CHANNELS: &str = "❌ No voice channels found in this server";
pub const CHANNEL_FETCH_FAILED: &str = "❌ Error fetching channels";
pub const NOTHING_TO_UNSUBSCRIBE: &str = "ℹ️ No active subscriptions in this channel";
pub const NO_GUILD_SUBSCRIPTIONS: &str = "ℹ️ No active subscriptions in this server";
pub const NOT_ADMINISTRATOR: &str = "❌ Only server administrators can set the admin channel";

/// A voice channel with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSource {
    pub id: String,
    pub name: String,
}

impl NamedSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub fn subscribed_text(source_name: &str, already_subscribed: bool) -> String {
    if already_subscribed {
        format!("ℹ️ Already subscribed to **{source_name}**")
    } else {
        format!(
            "✅ Subscribed! This channel will receive notifications for voice activity in **{source_name}**"
        )
    }
}

pub fn unsubscribed_text(source_name: &str, was_subscribed: bool) -> String {
    if was_subscribed {
        format!("✅ Unsubscribed from **{source_name}**")
    } else {
        format!("ℹ️ Not subscribed to **{source_name}**")
    }
}

pub fn admin_channel_set_text(target_id: &str) -> String {
    format!("✅ Admin channel set to <#{target_id}>")
}

pub fn denial_text(denial: &AdminDenial) -> String {
    match denial {
        AdminDenial::NoAdminChannel => {
            "❌ No admin channel has been set for this server. Please configure it using the ADMIN_CHANNELS environment variable or /set-admin-channel.".to_string()
        }
        AdminDenial::WrongChannel { admin_channel_id } => format!(
            "❌ This command can only be used in the admin channel: <#{admin_channel_id}>"
        ),
    }
}

pub fn text_reply(content: impl Into<String>) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(true)
}

/// Replaces a component message with plain text and drops its components.
pub fn text_update(content: impl Into<String>) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new()
        .content(content)
        .embeds(Vec::new())
        .components(Vec::new())
}

/// Select menu of voice channels, capped at [`SELECT_OPTION_LIMIT`].
pub fn channel_picker(
    custom_id: &str,
    prompt: &str,
    channels: &[NamedSource],
) -> CreateInteractionResponseMessage {
    let options = channels
        .iter()
        .take(SELECT_OPTION_LIMIT)
        .map(|channel| CreateSelectMenuOption::new(channel.name.clone(), channel.id.clone()))
        .collect();
    let menu = CreateSelectMenu::new(custom_id, CreateSelectMenuKind::String { options })
        .placeholder("Choose a voice channel");

    CreateInteractionResponseMessage::new()
        .content(prompt)
        .components(vec![CreateActionRow::SelectMenu(menu)])
        .ephemeral(true)
}

/// The admin overview: one embed field per voice channel plus a select menu
/// to drill into one of them. `sources` pairs each channel with its
/// subscriptions in the guild.
pub fn subscription_list(
    sources: &[(NamedSource, Vec<Subscription>)],
) -> CreateInteractionResponseMessage {
    let total: usize = sources.iter().map(|(_, subs)| subs.len()).sum();
    if total == 0 {
        return CreateInteractionResponseMessage::new()
            .content(NO_GUILD_SUBSCRIPTIONS)
            .embeds(Vec::new())
            .components(Vec::new());
    }

    let mut embed = CreateEmbed::new()
        .title("📋 Active Voice Channel Subscriptions")
        .colour(BLURPLE)
        .footer(CreateEmbedFooter::new(
            "Select a channel to remove specific subscriptions",
        ));
    let mut options = Vec::new();

    for (source, subscriptions) in sources.iter().take(EMBED_FIELD_LIMIT) {
        let targets: String = subscriptions
            .iter()
            .map(|subscription| format!("→ <#{}>\n", subscription.target_id))
            .collect();
        embed = embed.field(format!("{JOINED_GLYPH} {}", source.name), targets, true);

        if options.len() < SELECT_OPTION_LIMIT {
            options.push(
                CreateSelectMenuOption::new(source.name.clone(), source.id.clone())
                    .description(format!("{} subscription(s)", subscriptions.len()))
                    .emoji(ReactionType::Unicode(JOINED_GLYPH.to_string())),
            );
        }
    }

    let mut description = format!(
        "**Total:** {} subscription(s) across {} voice channel(s)\n\n",
        total,
        sources.len()
    );
    if sources.len() > EMBED_FIELD_LIMIT {
        description.push_str(&format!(
            "Showing the first {EMBED_FIELD_LIMIT} voice channels; {} more not listed.\n\n",
            sources.len() - EMBED_FIELD_LIMIT
        ));
    }
    description.push_str("Select a voice channel below to view and manage its subscriptions.");
    let embed = embed.description(description);
    let menu = CreateSelectMenu::new(MANAGE_SELECT_ID, CreateSelectMenuKind::String { options })
        .placeholder("Select a voice channel to manage...");

    CreateInteractionResponseMessage::new()
        .content("")
        .embed(embed)
        .components(vec![CreateActionRow::SelectMenu(menu)])
}

fn back_button(style: ButtonStyle) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(BACK_TO_LIST_ID)
            .label("← Back to List")
            .style(style),
    ])
}

pub fn remove_button_id(source_id: &str, target_id: &str) -> String {
    format!("{REMOVE_SUBSCRIPTION_PREFIX}{source_id}:{target_id}")
}

/// One source's subscriptions with a remove button each.
pub fn manage_view(
    source: &NamedSource,
    subscriptions: &[Subscription],
) -> CreateInteractionResponseMessage {
    if subscriptions.is_empty() {
        return text_update(format!(
            "ℹ️ No subscriptions found for **{}** in this server",
            source.name
        ));
    }

    let mut description = format!(
        "**Voice Channel:** {JOINED_GLYPH} {}\n\n**Notification Channels:**\n",
        source.name
    );
    let mut buttons = Vec::with_capacity(subscriptions.len().min(REMOVE_BUTTON_LIMIT));
    for (idx, subscription) in subscriptions.iter().enumerate() {
        description.push_str(&format!("{}. <#{}>\n", idx + 1, subscription.target_id));
        if buttons.len() < REMOVE_BUTTON_LIMIT {
            buttons.push(
                CreateButton::new(remove_button_id(&source.id, &subscription.target_id))
                    .label(format!("Remove #{}", idx + 1))
                    .style(ButtonStyle::Danger),
            );
        }
    }
    if subscriptions.len() > REMOVE_BUTTON_LIMIT {
        description.push_str(&format!(
            "\nOnly the first {REMOVE_BUTTON_LIMIT} can be removed here; remove some and reopen this view for the rest.\n"
        ));
    }

    let mut rows: Vec<CreateActionRow> = buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|chunk| CreateActionRow::Buttons(chunk.to_vec()))
        .collect();
    rows.push(back_button(ButtonStyle::Secondary));

    let embed = CreateEmbed::new()
        .title("🔧 Manage Subscriptions")
        .description(description)
        .colour(BLURPLE)
        .footer(CreateEmbedFooter::new(format!(
            "Managing subscriptions for voice channel: {}",
            source.name
        )));

    CreateInteractionResponseMessage::new()
        .content("")
        .embed(embed)
        .components(rows)
}

pub fn removal_result(
    source: &NamedSource,
    target_id: &str,
    removed: bool,
) -> CreateInteractionResponseMessage {
    if !removed {
        return CreateInteractionResponseMessage::new()
            .content(format!(
                "ℹ️ Subscription not found: **{}** → <#{}>",
                source.name, target_id
            ))
            .embeds(Vec::new())
            .components(vec![back_button(ButtonStyle::Secondary)]);
    }

    let embed = CreateEmbed::new()
        .title("✅ Subscription Removed")
        .description(format!(
            "Successfully removed subscription:\n\n{JOINED_GLYPH} **{}** → <#{}>",
            source.name, target_id
        ))
        .colour(GREEN);

    CreateInteractionResponseMessage::new()
        .content("")
        .embed(embed)
        .components(vec![back_button(ButtonStyle::Primary)])
}
