use reqwest::Method;
use uuid::Uuid;

use murmur_types::api::{
    AddMembersRequest, CreateChannelRequest, SendMessageRequest, StatusResponse, UpdateChannelRequest,
};
use murmur_types::events::{GatewayEvent, NewMessage};
use murmur_types::models::{Channel, ChannelMessage, Message, User};

use crate::api::{ApiClient, checked};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Personal,
    Channels,
}

/// Personal and channel conversation state.
///
/// `messages` always belongs to `selected_user` and `channel_messages` to
/// `selected_channel`; changing a selection clears the matching list.
pub struct ChatStore {
    api: ApiClient,
    pub current_tab: Tab,
    pub users: Vec<User>,
    pub channels: Vec<Channel>,
    pub messages: Vec<Message>,
    pub selected_user: Option<User>,
    pub channel_messages: Vec<ChannelMessage>,
    pub selected_channel: Option<Channel>,
}

impl ChatStore {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            current_tab: Tab::default(),
            users: Vec::new(),
            channels: Vec::new(),
            messages: Vec::new(),
            selected_user: None,
            channel_messages: Vec::new(),
            selected_channel: None,
        }
    }

    pub fn set_current_tab(&mut self, tab: Tab) {
        self.current_tab = tab;
    }

    pub fn set_selected_user(&mut self, user: Option<User>) {
        if self.selected_user.as_ref().map(|u| u.id) != user.as_ref().map(|u| u.id) {
            self.messages.clear();
        }
        self.selected_user = user;
    }

    pub fn set_selected_channel(&mut self, channel: Option<Channel>) {
        if self.selected_channel.as_ref().map(|c| c.id) != channel.as_ref().map(|c| c.id) {
            self.channel_messages.clear();
        }
        self.selected_channel = channel;
    }

    // -- Personal --

    pub async fn get_users(&mut self, search: Option<&str>) -> Result<&[User], ClientError> {
        self.users = self.api.get("/users", &search_query(search)).await?;
        Ok(&self.users)
    }

    pub async fn get_messages(&mut self, user_id: Uuid) -> Result<&[Message], ClientError> {
        self.messages = self.api.get(&format!("/messages/{}", user_id), &[]).await?;
        Ok(&self.messages)
    }

    /// Send to `selected_user` and append the stored message.
    pub async fn send_message(&mut self, req: SendMessageRequest) -> Result<&Message, ClientError> {
        let receiver = self.selected_user.as_ref().ok_or(ClientError::NothingSelected)?.id;
        let req = checked(req)?;
        let message: Message = self
            .api
            .send_json(Method::POST, &format!("/messages/send/{}", receiver), &req)
            .await?;

        self.messages.push(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    // -- Channels --

    pub async fn get_channels(&mut self, search: Option<&str>) -> Result<&[Channel], ClientError> {
        self.channels = self.api.get("/channels", &search_query(search)).await?;
        Ok(&self.channels)
    }

    pub async fn get_channel_messages(&mut self, channel_id: Uuid) -> Result<&[ChannelMessage], ClientError> {
        self.channel_messages = self
            .api
            .get(&format!("/messages/channel/{}", channel_id), &[])
            .await?;
        Ok(&self.channel_messages)
    }

    /// Post to `selected_channel` and append the stored message.
    pub async fn send_channel_message(&mut self, req: SendMessageRequest) -> Result<&ChannelMessage, ClientError> {
        let channel = self.selected_channel.as_ref().ok_or(ClientError::NothingSelected)?.id;
        let req = checked(req)?;
        let message: ChannelMessage = self
            .api
            .send_json(Method::POST, &format!("/messages/send/channel/{}", channel), &req)
            .await?;

        self.channel_messages.push(message);
        Ok(&self.channel_messages[self.channel_messages.len() - 1])
    }

    pub async fn create_channel(&mut self, req: CreateChannelRequest) -> Result<Channel, ClientError> {
        let req = checked(req)?;
        let channel: Channel = self.api.send_json(Method::POST, "/channels/create", &req).await?;
        self.channels.push(channel.clone());
        Ok(channel)
    }

    pub async fn rename_channel(&mut self, channel_id: Uuid, req: UpdateChannelRequest) -> Result<Channel, ClientError> {
        let req = checked(req)?;
        let channel: Channel = self
            .api
            .send_json(Method::PATCH, &format!("/channels/{}", channel_id), &req)
            .await?;
        self.replace_channel(&channel);
        Ok(channel)
    }

    pub async fn add_channel_members(
        &mut self,
        channel_id: Uuid,
        req: AddMembersRequest,
    ) -> Result<Channel, ClientError> {
        let req = checked(req)?;
        let channel: Channel = self
            .api
            .send_json(Method::POST, &format!("/channels/{}/members", channel_id), &req)
            .await?;
        self.replace_channel(&channel);
        Ok(channel)
    }

    /// Remove `member_id`, or leave the channel when it is the caller's own id.
    pub async fn remove_channel_member(&mut self, channel_id: Uuid, member_id: Uuid) -> Result<Channel, ClientError> {
        let channel: Channel = self
            .api
            .send_empty(Method::DELETE, &format!("/channels/{}/members/{}", channel_id, member_id))
            .await?;
        self.replace_channel(&channel);
        Ok(channel)
    }

    pub async fn delete_channel(&mut self, channel_id: Uuid) -> Result<(), ClientError> {
        let _: StatusResponse = self
            .api
            .send_empty(Method::DELETE, &format!("/channels/{}", channel_id))
            .await?;

        self.channels.retain(|c| c.id != channel_id);
        if self.selected_channel.as_ref().is_some_and(|c| c.id == channel_id) {
            self.set_selected_channel(None);
        }
        Ok(())
    }

    /// Fold a relay event into the open conversation. Only messages for the
    /// selected peer or selected channel are appended; returns whether the
    /// state changed.
    pub fn apply_event(&mut self, event: &GatewayEvent) -> bool {
        let GatewayEvent::NewMessage(new_message) = event else {
            return false;
        };

        match new_message {
            NewMessage::Direct(message) => {
                let from_selected = self
                    .selected_user
                    .as_ref()
                    .is_some_and(|u| u.id == message.sender_id);
                if from_selected {
                    self.messages.push(message.clone());
                }
                from_selected
            }
            NewMessage::Channel(message) => {
                let in_selected = self
                    .selected_channel
                    .as_ref()
                    .is_some_and(|c| c.id == message.channel_id);
                if in_selected {
                    self.channel_messages.push(message.clone());
                }
                in_selected
            }
        }
    }

    fn replace_channel(&mut self, channel: &Channel) {
        match self.channels.iter_mut().find(|c| c.id == channel.id) {
            Some(existing) => *existing = channel.clone(),
            None => self.channels.push(channel.clone()),
        }
        if let Some(selected) = self.selected_channel.as_mut().filter(|c| c.id == channel.id) {
            *selected = channel.clone();
        }
    }
}

fn search_query(search: Option<&str>) -> Vec<(&str, &str)> {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => vec![("search", term)],
        None => Vec::new(),
    }
}
