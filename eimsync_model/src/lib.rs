/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # The shared-schema catalogue.
//!
//! This crate declares the record classes and filters two peers must agree
//! on to synchronize items: content items and their stamps (notes, tasks,
//! events, alarms, mail), account and folder configuration, collections
//! and memberships, sharing state, and application preferences.
//!
//! Everything here is *schema data* for the [`eimsync`] core.
//! Interoperability requires the declarations to be byte-stable: URIs,
//! field names, field order, field types (sizes and decimal precision
//! included), defaults and filter membership all feed the registry
//! [checksum](eimsync::SchemaRegistry::checksum) that peers compare
//! before syncing. Change anything here and the schema is, by
//! definition, a different schema.
//!
//! Build one [`SharingSchema`] per process and share it:
//!
//! ```
//! let schema = eimsync_model::SharingSchema::new()?;
//! let record = schema.item.make(vec![
//!     eimsync::Value::text("f1e2d3c4"),
//!     eimsync::Value::text("Welcome"),
//!     eimsync::Value::NoChange,
//!     eimsync::Value::NoChange,
//!     eimsync::Value::NoChange,
//!     eimsync::Value::NoChange,
//!     eimsync::Value::NoChange,
//! ])?;
//! assert!(record.is_some());
//! # Ok::<(), eimsync::Error>(())
//! ```

mod convert;

use std::sync::Arc;

use eimsync::{
    FieldDef, Filter, KeyDef, RecordType, Result, SchemaRegistry, TypeOverrides, ValueKind,
};

pub use convert::separator_sort;

/// The filters peers use to trim local-only facets out of a share.
pub struct SharingFilters {
    pub triage: Arc<Filter>,
    pub created_on: Arc<Filter>,
    pub has_been_sent: Arc<Filter>,
    pub needs_reply: Arc<Filter>,
    pub read: Arc<Filter>,
    pub occurrence_deletion: Arc<Filter>,
    pub event_status: Arc<Filter>,
    pub ical_uid: Arc<Filter>,
    pub reminders: Arc<Filter>,
    pub non_standard_ical: Arc<Filter>,
    pub bcc: Arc<Filter>,
    pub headers: Arc<Filter>,
    pub date_sent: Arc<Filter>,
    pub message_id: Arc<Filter>,
    pub in_reply_to: Arc<Filter>,
    pub references: Arc<Filter>,
    pub mime_content: Arc<Filter>,
    pub rfc2822_message: Arc<Filter>,
    pub previous_sender: Arc<Filter>,
    pub reply_to_address: Arc<Filter>,
    pub message_state: Arc<Filter>,
}

impl SharingFilters {
    fn declare(registry: &mut SchemaRegistry) -> Result<SharingFilters> {
        Ok(SharingFilters {
            triage: registry.declare_filter(Some("cid:triage-filter@osaf.us"), "Triage Status")?,
            created_on: registry
                .declare_filter(Some("cid:created-on-filter@osaf.us"), "Created On")?,
            has_been_sent: registry
                .declare_filter(Some("cid:has-been-sent-filter@osaf.us"), "Has Been Sent")?,
            needs_reply: registry
                .declare_filter(Some("cid:needs-reply-filter@osaf.us"), "Needs Reply")?,
            read: registry.declare_filter(Some("cid:read-filter@osaf.us"), "Has Been Read")?,
            occurrence_deletion: registry.declare_filter(
                Some("cid:occurrence-deletion-filter@osaf.us"),
                "Occurrence deleted",
            )?,
            event_status: registry
                .declare_filter(Some("cid:event-status-filter@osaf.us"), "Event Status")?,
            ical_uid: registry.declare_filter(Some("cid:icaluid-filter@osaf.us"), "Ical UID")?,
            reminders: registry
                .declare_filter(Some("cid:reminders-filter@osaf.us"), "Reminders")?,
            non_standard_ical: registry.declare_filter(
                Some("cid:non-standard-ical-filter@osaf.us"),
                "Non-standard iCalendar values",
            )?,
            bcc: registry.declare_filter(Some("cid:bcc-filter@osaf.us"), "Bcc Addresses")?,
            headers: registry
                .declare_filter(Some("cid:headers-filter@osaf.us"), "Mail Headers")?,
            date_sent: registry
                .declare_filter(Some("cid:dateSent-filter@osaf.us"), "Date Sent")?,
            message_id: registry
                .declare_filter(Some("cid:messageId-filter@osaf.us"), "MessageId")?,
            in_reply_to: registry
                .declare_filter(Some("cid:inReplyTo-filter@osaf.us"), "InReplyTo")?,
            references: registry
                .declare_filter(Some("cid:references-filter@osaf.us"), "InReplyTo")?,
            mime_content: registry
                .declare_filter(Some("cid:mimeContent-filter@osaf.us"), "MIME Content")?,
            rfc2822_message: registry
                .declare_filter(Some("cid:rfc2822Message-filter@osaf.us"), "rfc 2822 Message")?,
            previous_sender: registry
                .declare_filter(Some("cid:previousSender-filter@osaf.us"), "Previous Sender")?,
            reply_to_address: registry
                .declare_filter(Some("cid:replyToAddress-filter@osaf.us"), "ReplyTo Address")?,
            message_state: registry
                .declare_filter(Some("cid:messageState-filter@osaf.us"), "Message State")?,
        })
    }
}

/// The full record-class catalogue, bound to its registry.
pub struct SharingSchema {
    pub registry: SchemaRegistry,
    pub filters: SharingFilters,

    // pim items
    pub item: Arc<RecordType>,
    pub modified_by: Arc<RecordType>,
    pub note: Arc<RecordType>,
    pub task: Arc<RecordType>,
    pub event: Arc<RecordType>,
    pub display_alarm: Arc<RecordType>,
    pub mail_message: Arc<RecordType>,

    // application / accounts
    pub client_id: Arc<RecordType>,
    pub private_item: Arc<RecordType>,
    pub password: Arc<RecordType>,
    pub password_prefs: Arc<RecordType>,
    pub mail_account: Arc<RecordType>,
    pub imap_account_folders: Arc<RecordType>,
    pub smtp_account: Arc<RecordType>,
    pub smtp_account_queue: Arc<RecordType>,
    pub imap_account: Arc<RecordType>,
    pub pop_account: Arc<RecordType>,
    pub imap_folder: Arc<RecordType>,
    pub mail_prefs: Arc<RecordType>,
    pub email_address: Arc<RecordType>,

    // collections
    pub collection: Arc<RecordType>,
    pub collection_membership: Arc<RecordType>,
    pub dashboard_membership: Arc<RecordType>,
    pub trash_membership: Arc<RecordType>,

    // sharing
    pub share: Arc<RecordType>,
    pub share_conduit: Arc<RecordType>,
    pub share_rs_conduit: Arc<RecordType>,
    pub share_mono_rs_conduit: Arc<RecordType>,
    pub share_webdav_mono_rs_conduit: Arc<RecordType>,
    pub share_http_conduit: Arc<RecordType>,
    pub share_cosmo_conduit: Arc<RecordType>,
    pub share_webdav_conduit: Arc<RecordType>,
    pub share_state: Arc<RecordType>,
    pub share_peer_state: Arc<RecordType>,
    pub share_resource_state: Arc<RecordType>,
    pub share_shared_in: Arc<RecordType>,
    pub share_account: Arc<RecordType>,
    pub share_webdav_account: Arc<RecordType>,
    pub share_cosmo_account: Arc<RecordType>,
    pub share_hub_account: Arc<RecordType>,
    pub share_prefs: Arc<RecordType>,
    pub share_proxy: Arc<RecordType>,

    // preferences
    pub pref_calendar_hour_height: Arc<RecordType>,
    pub pref_timezones: Arc<RecordType>,
    pub application_prefs: Arc<RecordType>,
    pub update_check_prefs: Arc<RecordType>,
    pub auto_restore_prefs: Arc<RecordType>,
}

impl SharingSchema {
    pub fn new() -> Result<SharingSchema> {
        let mut registry = SchemaRegistry::new();

        let text20 = registry.declare_text(None, 20)?;
        let text50 = registry.declare_text(None, 50)?;
        let text256 = registry.declare_text(None, 256)?;
        let text1024 = registry.declare_text(None, 1024)?;
        let text4096 = registry.declare_text(None, 4096)?;
        let text32k = registry.declare_text(None, 32768)?;
        let bytes32 = registry.declare_bytes(None, 32)?;
        let bytes64 = registry.declare_bytes(None, 64)?;
        let bytes1024 = registry.declare_bytes(None, 1024)?;
        let int = registry.declare_int(None)?;
        let clob = registry.declare_clob(None)?;
        let blob = registry.declare_blob(None)?;
        // Seconds-since-epoch wide enough for any timestamp.
        let decimal20 = registry.declare_decimal(None, 20, 0)?;
        // Modification times keep centisecond precision.
        let decimal12_2 = registry.declare_decimal(None, 12, 2)?;
        let uuid = registry.uuid_type().clone();
        let aliasable_uuid = registry.subtype(&uuid, None, TypeOverrides::size(256))?;

        // Recurrence fields canonicalize their clause order; see `convert`.
        let rrule_field = registry.subtype(&text32k, None, TypeOverrides::default())?;
        let rdate_field = registry.subtype(&text32k, None, TypeOverrides::default())?;
        registry.add_converter(&rrule_field, ValueKind::Text, separator_sort(';', None))?;
        registry.add_converter(&rdate_field, ValueKind::Text, separator_sort(',', Some(':')))?;

        let filters = SharingFilters::declare(&mut registry)?;

        // pim items -----------------------------------------------------

        let item = RecordType::builder("ItemRecord", "http://osafoundation.org/eim/item/0")
            .key(KeyDef::new("uuid", &aliasable_uuid))
            .field(FieldDef::new("title", &text1024).title("Title"))
            .field(
                FieldDef::new("triage", &text256)
                    .title("Triage status")
                    .filter(&filters.triage),
            )
            .field(
                FieldDef::new("createdOn", &decimal20)
                    .title("Created on")
                    .filter(&filters.created_on),
            )
            .field(
                FieldDef::new("hasBeenSent", &int)
                    .title("Has been sent")
                    .filter(&filters.has_been_sent),
            )
            .field(
                FieldDef::new("needsReply", &int)
                    .title("Needs reply")
                    .filter(&filters.needs_reply)
                    .default(0),
            )
            .field(
                FieldDef::new("read", &int)
                    .title("Has been read")
                    .filter(&filters.read)
                    .default(0),
            )
            .build(&mut registry)?;

        let modified_by = RecordType::builder(
            "ModifiedByRecord",
            "http://osafoundation.org/eim/modifiedBy/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .key(KeyDef::new("userid", &text256).title("User ID"))
        .key(KeyDef::new("timestamp", &decimal12_2).title("Last modified"))
        .key(KeyDef::new("action", &int).title("Action"))
        .build(&mut registry)?;

        let note = RecordType::builder("NoteRecord", "http://osafoundation.org/eim/note/0")
            .key(KeyDef::new("uuid", item.field_ref("uuid")?))
            .field(FieldDef::new("body", &clob).title("Body"))
            .field(
                FieldDef::new("icalUid", &text256)
                    .title("Icalendar UID")
                    .filter(&filters.ical_uid),
            )
            .field(FieldDef::new("icalProperties", &text1024).filter(&filters.non_standard_ical))
            .field(FieldDef::new("icalParameters", &text1024).filter(&filters.non_standard_ical))
            .field(
                FieldDef::new("icalExtra", &text4096)
                    .default("")
                    .filter(&filters.non_standard_ical),
            )
            .build(&mut registry)?;

        // The task stamp shares no attributes; the record's existence is
        // the whole payload.
        let task = RecordType::builder("TaskRecord", "http://osafoundation.org/eim/task/0")
            .key(KeyDef::new("uuid", note.field_ref("uuid")?))
            .build(&mut registry)?;

        let event = RecordType::builder("EventRecord", "http://osafoundation.org/eim/event/0")
            .key(KeyDef::new("uuid", note.field_ref("uuid")?))
            .field(FieldDef::new("dtstart", &text20).title("Start time"))
            .field(FieldDef::new("duration", &text20).title("Duration"))
            .field(FieldDef::new("location", &text256).title("Location"))
            .field(FieldDef::new("rrule", &rrule_field))
            .field(FieldDef::new("exrule", &rrule_field).filter(&filters.occurrence_deletion))
            .field(FieldDef::new("rdate", &rdate_field))
            .field(FieldDef::new("exdate", &rdate_field).filter(&filters.occurrence_deletion))
            .field(
                FieldDef::new("status", &text256)
                    .title("Event status")
                    .filter(&filters.event_status),
            )
            .field(
                FieldDef::new("lastPastOccurrence", &text20)
                    .default("")
                    .filter(&filters.triage),
            )
            .build(&mut registry)?;

        let display_alarm = RecordType::builder(
            "DisplayAlarmRecord",
            "http://osafoundation.org/eim/displayAlarm/0",
        )
        .key(KeyDef::new("uuid", event.field_ref("uuid")?))
        .field(
            FieldDef::new("description", &text1024)
                .title("Alarm description")
                .filter(&filters.reminders),
        )
        .field(
            FieldDef::new("trigger", &text1024)
                .title("Alarm trigger")
                .filter(&filters.reminders),
        )
        .field(
            FieldDef::new("duration", &text1024)
                .title("Alarm duration")
                .filter(&filters.reminders),
        )
        .field(
            FieldDef::new("repeat", &int)
                .title("Alarm repeat")
                .filter(&filters.reminders),
        )
        .build(&mut registry)?;

        let mail_message =
            RecordType::builder("MailMessageRecord", "http://osafoundation.org/eim/mail/0")
                .key(KeyDef::new("uuid", note.field_ref("uuid")?))
                .field(
                    FieldDef::new("messageId", &text256)
                        .title("Message ID")
                        .filter(&filters.message_id),
                )
                .field(
                    FieldDef::new("headers", &clob)
                        .title("Message headers")
                        .filter(&filters.headers),
                )
                .field(FieldDef::new("fromAddress", &text256).title("From"))
                .field(FieldDef::new("toAddress", &text1024).title("To"))
                .field(FieldDef::new("ccAddress", &text1024).title("CC"))
                .field(
                    FieldDef::new("bccAddress", &text1024)
                        .title("BCC")
                        .filter(&filters.bcc),
                )
                // Free text or addresses, e.g. "The Management Team".
                .field(FieldDef::new("originators", &text1024).title("Originators"))
                .field(
                    FieldDef::new("dateSent", &text256)
                        .title("Date sent")
                        .filter(&filters.date_sent),
                )
                .field(
                    FieldDef::new("inReplyTo", &text256)
                        .title("In-Reply-to")
                        .filter(&filters.in_reply_to),
                )
                // Referenced message-ids easily exceed a sized text field.
                .field(
                    FieldDef::new("references", &clob)
                        .title("References")
                        .filter(&filters.references),
                )
                .field(
                    FieldDef::new("mimeContent", &clob)
                        .title("MIME content")
                        .filter(&filters.mime_content),
                )
                .field(
                    FieldDef::new("rfc2822Message", &clob)
                        .title("RFC2822 message")
                        .filter(&filters.rfc2822_message),
                )
                .field(
                    FieldDef::new("previousSender", &text256)
                        .title("Previous sender")
                        .filter(&filters.previous_sender),
                )
                .field(
                    FieldDef::new("replyToAddress", &text256)
                        .title("Reply-to address")
                        .filter(&filters.reply_to_address),
                )
                // Bit-wise state flags; one int keeps mail-client flag
                // churn out of the schema.
                .field(
                    FieldDef::new("messageState", &int)
                        .title("Message state")
                        .filter(&filters.message_state),
                )
                .build(&mut registry)?;

        // application / accounts (not shared with server peers) ---------

        let client_id = RecordType::builder(
            "ClientIDRecord",
            "http://osafoundation.org/eim/application/client_id/0",
        )
        .field(FieldDef::new("clientID", &bytes64))
        .build(&mut registry)?;

        let private_item = RecordType::builder(
            "PrivateItemRecord",
            "http://osafoundation.org/eim/pim/private/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .build(&mut registry)?;

        let password =
            RecordType::builder("PasswordRecord", "http://osafoundation.org/eim/password/0")
                .key(KeyDef::new("uuid", item.field_ref("uuid")?))
                .field(FieldDef::new("ciphertext", &bytes1024))
                .field(FieldDef::new("iv", &bytes32))
                .field(FieldDef::new("salt", &bytes32))
                .build(&mut registry)?;

        let password_prefs = RecordType::builder(
            "PasswordPrefsRecord",
            "http://osafoundation.org/eim/password/prefs/0",
        )
        .field(FieldDef::new("dummyPassword", &uuid))
        .field(FieldDef::new("masterPassword", &int))
        .field(FieldDef::new("timeout", &int))
        // 0 = None, 1 = True, 2 = False
        .field(FieldDef::new("protect", &int).default(0))
        .build(&mut registry)?;

        let mail_account = RecordType::builder(
            "MailAccountRecord",
            "http://osafoundation.org/eim/sharing/mailaccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("retries", &int))
        .field(FieldDef::new("username", &text256))
        .field(FieldDef::new("host", &text256))
        // 0 = None, 1 = TLS, 2 = SSL
        .field(FieldDef::new("connectionType", &int))
        .field(FieldDef::new("frequency", &int))
        .field(FieldDef::new("timeout", &int))
        // 0 = inactive, 1 = active
        .field(FieldDef::new("active", &int))
        .build(&mut registry)?;

        let imap_account_folders = RecordType::builder(
            "IMAPAccountFoldersRecord",
            "http://osafoundation.org/eim/pim/imapaccountfolders/0",
        )
        .key(KeyDef::new("imapAccountUUID", &uuid))
        .key(KeyDef::new("imapFolderUUID", &aliasable_uuid))
        .build(&mut registry)?;

        let smtp_account = RecordType::builder(
            "SMTPAccountRecord",
            "http://osafoundation.org/eim/sharing/smtpccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("password", &uuid))
        .field(FieldDef::new("fromAddress", &text256))
        .field(FieldDef::new("useAuth", &int))
        .field(FieldDef::new("port", &int))
        .field(FieldDef::new("isDefault", &int))
        .build(&mut registry)?;

        let smtp_account_queue = RecordType::builder(
            "SMTPAccountQueueRecord",
            "http://osafoundation.org/eim/pim/smtpaccountqueue/0",
        )
        .key(KeyDef::new("smtpAccountUUID", &uuid))
        .key(KeyDef::new("itemUUID", &aliasable_uuid))
        .build(&mut registry)?;

        let imap_account = RecordType::builder(
            "IMAPAccountRecord",
            "http://osafoundation.org/eim/sharing/imapaccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("password", &uuid))
        .field(FieldDef::new("replyToAddress", &text256))
        .field(FieldDef::new("port", &int))
        .field(FieldDef::new("isDefault", &int))
        .build(&mut registry)?;

        let pop_account = RecordType::builder(
            "POPAccountRecord",
            "http://osafoundation.org/eim/sharing/popaccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("password", &uuid))
        .field(FieldDef::new("replyToAddress", &text256))
        .field(FieldDef::new("type", &text50))
        .field(FieldDef::new("delete", &int))
        .field(FieldDef::new("downloaded", &int))
        .field(FieldDef::new("downloadMax", &int))
        .field(FieldDef::new("seenUIDS", &clob))
        .field(FieldDef::new("port", &int))
        .field(FieldDef::new("isDefault", &int))
        .build(&mut registry)?;

        let imap_folder = RecordType::builder(
            "IMAPFolderRecord",
            "http://osafoundation.org/eim/sharing/imapfolder/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("name", &text256))
        .field(FieldDef::new("type", &text50))
        .field(FieldDef::new("lastUID", &int))
        .field(FieldDef::new("delete", &int))
        .field(FieldDef::new("downloaded", &int))
        .field(FieldDef::new("downloadMax", &int))
        .build(&mut registry)?;

        let mail_prefs = RecordType::builder(
            "MailPrefsRecord",
            "http://osafoundation.org/eim/mail/prefs/0",
        )
        // 1 = online
        .field(FieldDef::new("isOnline", &int))
        // Every current and former "me" address, for fromMe/toMe flags.
        .field(FieldDef::new("meAddressHistory", &clob))
        .build(&mut registry)?;

        let email_address = RecordType::builder(
            "EmailAddressRecord",
            "http://osafoundation.org/eim/mail/address/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("fullName", &text256))
        .field(FieldDef::new("address", &text256))
        .build(&mut registry)?;

        // collections ----------------------------------------------------

        let collection = RecordType::builder(
            "CollectionRecord",
            "http://osafoundation.org/eim/pim/collection/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("mine", &int))
        // Four signed channels rather than one packed int, since the int
        // type is signed.
        .key(KeyDef::new("colorRed", &int))
        .key(KeyDef::new("colorGreen", &int))
        .key(KeyDef::new("colorBlue", &int))
        .key(KeyDef::new("colorAlpha", &int))
        .field(FieldDef::new("checked", &int).default(0))
        .build(&mut registry)?;

        // Membership in a user-created (not out-of-the-box) collection.
        let collection_membership = RecordType::builder(
            "CollectionMembershipRecord",
            "http://osafoundation.org/eim/pim/collectionmembership/0",
        )
        .key(KeyDef::new("collectionID", &text256))
        .key(KeyDef::new("itemUUID", &aliasable_uuid))
        .key(KeyDef::new("index", &int))
        .build(&mut registry)?;

        // Direct dashboard membership, as opposed to membership via a
        // "mine" collection.
        let dashboard_membership = RecordType::builder(
            "DashboardMembershipRecord",
            "http://osafoundation.org/eim/pim/dashboardmembership/0",
        )
        .key(KeyDef::new("itemUUID", &aliasable_uuid))
        .build(&mut registry)?;

        let trash_membership = RecordType::builder(
            "TrashMembershipRecord",
            "http://osafoundation.org/eim/pim/trashmembership/0",
        )
        .key(KeyDef::new("itemUUID", &aliasable_uuid))
        .build(&mut registry)?;

        // sharing --------------------------------------------------------

        let share = RecordType::builder(
            "ShareRecord",
            "http://osafoundation.org/eim/sharing/share/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("contents", &uuid))
        .field(FieldDef::new("conduit", &uuid))
        .field(FieldDef::new("subscribed", &int))
        .field(FieldDef::new("error", &clob))
        .field(FieldDef::new("errorDetails", &clob))
        .field(FieldDef::new("mode", &text20))
        .field(FieldDef::new("lastSuccess", &decimal20))
        .field(FieldDef::new("lastAttempt", &decimal20))
        .build(&mut registry)?;

        let share_conduit = RecordType::builder(
            "ShareConduitRecord",
            "http://osafoundation.org/eim/sharing/conduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("path", &text1024))
        .field(FieldDef::new("name", &text1024))
        .build(&mut registry)?;

        let share_rs_conduit = RecordType::builder(
            "ShareRecordSetConduitRecord",
            "http://osafoundation.org/eim/sharing/rsconduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("translator", &text1024))
        .field(FieldDef::new("serializer", &text1024))
        .field(FieldDef::new("filters", &text1024))
        .field(FieldDef::new("syncToken", &text256))
        .build(&mut registry)?;

        let share_mono_rs_conduit = RecordType::builder(
            "ShareMonolithicRecordSetConduitRecord",
            "http://osafoundation.org/eim/sharing/monorsconduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("etag", &text1024))
        .build(&mut registry)?;

        let share_webdav_mono_rs_conduit = RecordType::builder(
            "ShareWebDAVMonolithicRecordSetConduitRecord",
            "http://osafoundation.org/eim/sharing/webdavmonorsconduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .build(&mut registry)?;

        let share_http_conduit = RecordType::builder(
            "ShareHTTPConduitRecord",
            "http://osafoundation.org/eim/sharing/httpconduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("ticket", &text1024))
        .field(FieldDef::new("ticket_rw", &text1024))
        .field(FieldDef::new("ticket_ro", &text1024))
        // When an account is given, the remaining fields are ignored.
        .field(FieldDef::new("account", &uuid))
        .field(FieldDef::new("host", &text256))
        .field(FieldDef::new("port", &int))
        .field(FieldDef::new("ssl", &int))
        .field(FieldDef::new("username", &text256))
        .field(FieldDef::new("password", &uuid))
        .build(&mut registry)?;

        let share_cosmo_conduit = RecordType::builder(
            "ShareCosmoConduitRecord",
            "http://osafoundation.org/eim/sharing/cosmoconduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("morsecodepath", &text1024))
        .build(&mut registry)?;

        let share_webdav_conduit = RecordType::builder(
            "ShareWebDAVConduitRecord",
            "http://osafoundation.org/eim/sharing/webdavconduit/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .build(&mut registry)?;

        let share_state = RecordType::builder(
            "ShareStateRecord",
            "http://osafoundation.org/eim/sharing/sharestate/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("share", &uuid))
        .field(FieldDef::new("alias", &text1024))
        .field(FieldDef::new("conflict_item", &uuid))
        .field(FieldDef::new("conflict_share", &uuid))
        .field(FieldDef::new("agreed", &blob)) // obsolete
        .field(FieldDef::new("pending", &blob)) // obsolete
        .field(FieldDef::new("stateRecords", &blob).default(eimsync::Value::Blob(Vec::new())))
        .field(FieldDef::new("pendingRemoval", &int).default(0))
        .build(&mut registry)?;

        let share_peer_state = RecordType::builder(
            "SharePeerStateRecord",
            "http://osafoundation.org/eim/sharing/peerstate/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("peer", &uuid))
        .field(FieldDef::new("item", &uuid))
        .field(FieldDef::new("peerrepo", &text1024))
        .field(FieldDef::new("peerversion", &int))
        .build(&mut registry)?;

        let share_resource_state = RecordType::builder(
            "ShareResourceStateRecord",
            "http://osafoundation.org/eim/sharing/resourcesharestate/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("path", &text1024))
        .field(FieldDef::new("etag", &text1024))
        .build(&mut registry)?;

        let share_shared_in = RecordType::builder(
            "ShareSharedInRecord",
            "http://osafoundation.org/eim/sharing/sharedin/0",
        )
        .key(KeyDef::new("item", &uuid))
        .key(KeyDef::new("share", &uuid))
        .build(&mut registry)?;

        let share_account = RecordType::builder(
            "ShareAccountRecord",
            "http://osafoundation.org/eim/sharing/account/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("host", &text256))
        .field(FieldDef::new("port", &int))
        .field(FieldDef::new("ssl", &int))
        .field(FieldDef::new("path", &text1024))
        .field(FieldDef::new("username", &text256))
        .field(FieldDef::new("password", &uuid))
        .build(&mut registry)?;

        let share_webdav_account = RecordType::builder(
            "ShareWebDAVAccountRecord",
            "http://osafoundation.org/eim/sharing/webdavaccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .build(&mut registry)?;

        let share_cosmo_account = RecordType::builder(
            "ShareCosmoAccountRecord",
            "http://osafoundation.org/eim/sharing/cosmoaccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("pimpath", &text1024))
        .field(FieldDef::new("morsecodepath", &text1024))
        .field(FieldDef::new("davpath", &text1024))
        .build(&mut registry)?;

        let share_hub_account = RecordType::builder(
            "ShareHubAccountRecord",
            "http://osafoundation.org/eim/sharing/hubaccount/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .build(&mut registry)?;

        let share_prefs = RecordType::builder(
            "SharePrefsRecord",
            "http://osafoundation.org/eim/sharing/prefs/0",
        )
        // 1 = online, 0 = offline
        .field(FieldDef::new("isOnline", &int).default(1))
        .build(&mut registry)?;

        let share_proxy = RecordType::builder(
            "ShareProxyRecord",
            "http://osafoundation.org/eim/sharing/proxy/0",
        )
        .key(KeyDef::new("uuid", item.field_ref("uuid")?))
        .field(FieldDef::new("host", &text256))
        .field(FieldDef::new("port", &int))
        .field(FieldDef::new("protocol", &text256))
        .field(FieldDef::new("useAuth", &int))
        .field(FieldDef::new("username", &text256))
        .field(FieldDef::new("password", &uuid))
        .field(FieldDef::new("active", &int))
        .field(FieldDef::new("bypass", &text256).default(""))
        .build(&mut registry)?;

        // preferences ----------------------------------------------------

        let pref_calendar_hour_height = RecordType::builder(
            "PrefCalendarHourHeightRecord",
            "http://osafoundation.org/eim/preferences/calendarhourheight/0",
        )
        .field(FieldDef::new("hourHeightMode", &text20))
        .field(FieldDef::new("visibleHours", &int))
        .build(&mut registry)?;

        let pref_timezones = RecordType::builder(
            "PrefTimezonesRecord",
            "http://osafoundation.org/eim/preferences/timezones/0",
        )
        .field(FieldDef::new("showUI", &int))
        .field(FieldDef::new("showPrompt", &int))
        .field(FieldDef::new("default", &text256))
        .field(FieldDef::new("wellKnownIDs", &text1024))
        .build(&mut registry)?;

        let application_prefs = RecordType::builder(
            "ApplicationPrefsRecord",
            "http://osafoundation.org/eim/preferences/application/0",
        )
        // 1 = online, 0 = offline
        .field(FieldDef::new("isOnline", &int).default(1))
        // 0 = None, 1 = True, 2 = False
        .field(FieldDef::new("backupOnQuit", &int).default(0))
        .field(FieldDef::new("showTip", &int).default(1))
        .field(FieldDef::new("tipIndex", &int).default(0))
        .build(&mut registry)?;

        let update_check_prefs = RecordType::builder(
            "UpdateCheckPrefsRecord",
            "http://osafoundation.org/eim/preferences/updates/0",
        )
        .field(FieldDef::new("numDays", &int))
        .build(&mut registry)?;

        let auto_restore_prefs = RecordType::builder(
            "AutoRestorePrefsRecord",
            "http://osafoundation.org/eim/preferences/autorestore/0",
        )
        // 0 = False, 1 = True
        .field(FieldDef::new("enabled", &int))
        .build(&mut registry)?;

        Ok(SharingSchema {
            registry,
            filters,
            item,
            modified_by,
            note,
            task,
            event,
            display_alarm,
            mail_message,
            client_id,
            private_item,
            password,
            password_prefs,
            mail_account,
            imap_account_folders,
            smtp_account,
            smtp_account_queue,
            imap_account,
            pop_account,
            imap_folder,
            mail_prefs,
            email_address,
            collection,
            collection_membership,
            dashboard_membership,
            trash_membership,
            share,
            share_conduit,
            share_rs_conduit,
            share_mono_rs_conduit,
            share_webdav_mono_rs_conduit,
            share_http_conduit,
            share_cosmo_conduit,
            share_webdav_conduit,
            share_state,
            share_peer_state,
            share_resource_state,
            share_shared_in,
            share_account,
            share_webdav_account,
            share_cosmo_account,
            share_hub_account,
            share_prefs,
            share_proxy,
            pref_calendar_hour_height,
            pref_timezones,
            application_prefs,
            update_check_prefs,
            auto_restore_prefs,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::OnceLock;

    use eimsync::{
        sort_records, Diff, ItemStore, ItemType, Record, RecordBag, RecordSet, Translator,
        TranslatorSpec, Value,
    };

    /// An in-memory stand-in for the application's item model: items are
    /// attribute maps keyed by UUID, add-ons live under a prefixed
    /// attribute namespace on their item.
    #[derive(Default)]
    struct PimStore {
        items: HashMap<String, HashMap<String, Value>>,
        types: HashMap<String, Arc<ItemType>>,
        installed: HashMap<String, Vec<String>>,
        initials: HashMap<String, Value>,
        deleted: Vec<String>,
    }

    #[derive(Clone)]
    struct Handle {
        uuid: String,
        addon: Option<String>,
    }

    impl PimStore {
        fn with_initial(name: &str, value: Value) -> PimStore {
            let mut store = PimStore::default();
            store.initials.insert(name.to_owned(), value);
            store
        }

        fn attr_key(target: &Handle, name: &str) -> String {
            match &target.addon {
                Some(addon) => format!("{addon}.{name}"),
                None => name.to_owned(),
            }
        }

        fn attr(&self, uuid: &str, name: &str) -> Option<&Value> {
            self.items.get(uuid).and_then(|attrs| attrs.get(name))
        }
    }

    impl ItemStore for PimStore {
        type Item = Handle;

        fn item_for_uuid(&mut self, uuid: &str) -> anyhow::Result<Handle> {
            self.items.entry(uuid.to_owned()).or_default();
            Ok(Handle {
                uuid: uuid.to_owned(),
                addon: None,
            })
        }

        fn item_type(&self, item: &Handle) -> Arc<ItemType> {
            self.types
                .get(&item.uuid)
                .cloned()
                .unwrap_or_else(content_item_type)
        }

        fn extensions(&self, item: &Handle) -> Vec<Handle> {
            self.installed
                .get(&item.uuid)
                .map(|names| {
                    names
                        .iter()
                        .map(|name| Handle {
                            uuid: item.uuid.clone(),
                            addon: Some(name.clone()),
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        fn addon_for(&mut self, item: &Handle, ty: &Arc<ItemType>) -> anyhow::Result<Handle> {
            Ok(Handle {
                uuid: item.uuid.clone(),
                addon: Some(ty.name().to_owned()),
            })
        }

        fn extension_installed(&self, item: &Handle, ty: &Arc<ItemType>) -> bool {
            self.installed
                .get(&item.uuid)
                .map_or(false, |names| names.iter().any(|n| n == ty.name()))
        }

        fn install_extension(
            &mut self,
            item: &Handle,
            ty: &Arc<ItemType>,
        ) -> anyhow::Result<Handle> {
            self.installed
                .entry(item.uuid.clone())
                .or_default()
                .push(ty.name().to_owned());
            self.addon_for(item, ty)
        }

        fn set_attribute(
            &mut self,
            target: &Handle,
            name: &str,
            value: &Value,
        ) -> anyhow::Result<()> {
            self.items
                .entry(target.uuid.clone())
                .or_default()
                .insert(Self::attr_key(target, name), value.clone());
            Ok(())
        }

        fn initial_value(&self, _target: &Handle, name: &str) -> anyhow::Result<Value> {
            Ok(self.initials.get(name).cloned().unwrap_or(Value::Absent))
        }

        fn uuid(&self, item: &Handle) -> String {
            item.uuid.clone()
        }
    }

    fn content_item_type() -> Arc<ItemType> {
        static TYPE: OnceLock<Arc<ItemType>> = OnceLock::new();
        TYPE.get_or_init(|| ItemType::item("ContentItem")).clone()
    }

    fn import_item(tr: &mut Translator<PimStore>, record: &Record) -> anyhow::Result<()> {
        let slot = |name: &str| record.get(name).cloned().unwrap_or(Value::NoChange);
        let uuid = slot("uuid").to_string();
        let attrs = [
            ("title", slot("title")),
            ("triage", slot("triage")),
            ("read", slot("read")),
        ];
        tr.with_item_for_uuid(&uuid, &content_item_type(), &attrs, |_, _| Ok(()));
        Ok(())
    }

    fn delete_item(tr: &mut Translator<PimStore>, record: &Record) -> anyhow::Result<()> {
        let uuid = record
            .get("uuid")
            .cloned()
            .unwrap_or(Value::Absent)
            .to_string();
        tr.store_mut().deleted.push(uuid);
        Ok(())
    }

    fn pim_translator(
        schema: &mut SharingSchema,
        with_deleter: bool,
    ) -> Arc<TranslatorSpec<PimStore>> {
        let uri = if with_deleter {
            "cid:pim-translator@osaf.us"
        } else {
            "cid:pim-translator-nodelete@osaf.us"
        };
        let builder = TranslatorSpec::builder(uri, 1, "PIM items")
            .importer(&schema.item, import_item);
        let builder = if with_deleter {
            builder.deleter(&schema.item, delete_item)
        } else {
            builder
        };
        builder.build(&mut schema.registry).unwrap()
    }

    fn item_record(schema: &SharingSchema, uuid: &str, title: Value, triage: Value, read: Value) -> Record {
        schema
            .item
            .make(vec![
                Value::text(uuid),
                title,
                triage,
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
                read,
            ])
            .unwrap()
            .unwrap()
    }

    #[test]
    fn catalogue_registers_every_uri() {
        let schema = SharingSchema::new().unwrap();
        for uri in [
            "http://osafoundation.org/eim/item/0",
            "http://osafoundation.org/eim/modifiedBy/0",
            "http://osafoundation.org/eim/note/0",
            "http://osafoundation.org/eim/task/0",
            "http://osafoundation.org/eim/event/0",
            "http://osafoundation.org/eim/displayAlarm/0",
            "http://osafoundation.org/eim/mail/0",
            "http://osafoundation.org/eim/sharing/share/0",
            "http://osafoundation.org/eim/preferences/application/0",
        ] {
            assert!(schema.registry.lookup(uri).is_some(), "missing {uri}");
        }
        assert!(schema.registry.lookup("cid:triage-filter@osaf.us").is_some());
        assert_eq!(schema.registry.record_types().len(), 47);
    }

    #[test]
    fn item_record_shape_matches_the_wire() {
        let schema = SharingSchema::new().unwrap();
        let names: Vec<&str> = schema.item.fields().iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            vec![
                "uuid",
                "title",
                "triage",
                "createdOn",
                "hasBeenSent",
                "needsReply",
                "read"
            ]
        );
        assert_eq!(schema.item.key_offsets(), &[0]);
        // Collection keys interleave with plain fields in declared order.
        assert_eq!(schema.collection.key_offsets(), &[0, 2, 3, 4, 5]);
        // The modification log is keyed by all four of its fields.
        assert_eq!(schema.modified_by.key_offsets(), &[0, 1, 2, 3]);
    }

    #[test]
    fn schema_checksums_are_reproducible() {
        let a = SharingSchema::new().unwrap();
        let b = SharingSchema::new().unwrap();
        assert_eq!(a.registry.checksum(), b.registry.checksum());
    }

    #[test]
    fn decimal_fields_hold_fixed_precision_values() {
        let schema = SharingSchema::new().unwrap();
        let created = rust_decimal::Decimal::new(1_214_409_600, 0);
        let record = schema
            .item
            .make(vec![
                Value::text("u"),
                Value::NoChange,
                Value::NoChange,
                Value::Decimal(created),
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
            ])
            .unwrap()
            .unwrap();
        assert_eq!(record.get("createdOn"), Some(&Value::Decimal(created)));
    }

    #[test]
    fn uuids_are_case_normalized_by_make() {
        let schema = SharingSchema::new().unwrap();
        let record = item_record(
            &schema,
            "ABC-DEF:20080101T000000Z",
            "x".into(),
            Value::NoChange,
            Value::NoChange,
        );
        assert_eq!(
            record.get("uuid"),
            Some(&Value::text("abc-def:20080101T000000Z"))
        );
    }

    #[test]
    fn recurrence_rules_canonicalize_on_construction() {
        let schema = SharingSchema::new().unwrap();
        let event = schema
            .event
            .make(vec![
                Value::text("u"),
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
                Value::text("FREQ=WEEKLY;BYDAY=TU"),
                Value::NoChange,
                Value::text("VALUE=DATE:20080201,20080101"),
                Value::NoChange,
                Value::NoChange,
            ])
            .unwrap()
            .unwrap();
        assert_eq!(record_field(&event, "rrule"), "BYDAY=TU;FREQ=WEEKLY");
        assert_eq!(
            record_field(&event, "rdate"),
            "VALUE=DATE:20080101,20080201"
        );
    }

    fn record_field(record: &Record, name: &str) -> String {
        record.get(name).unwrap().to_string()
    }

    // Scenario: a partial update applied onto full state asserts only the
    // slots it carries.
    #[test]
    fn partial_update_full_apply() {
        let schema = SharingSchema::new().unwrap();
        let old = item_record(&schema, "u", "old".into(), "now".into(), Value::Int(1));
        let update = item_record(&schema, "u", "A".into(), Value::NoChange, Value::Int(0));
        let merged = old.apply(&update).unwrap();
        assert_eq!(merged.get("title"), Some(&Value::text("A")));
        assert_eq!(merged.get("triage"), Some(&Value::text("now")));
        assert_eq!(merged.get("read"), Some(&Value::Int(0)));
    }

    // Scenario: subtract, then apply the diff to the subtrahend.
    #[test]
    fn subtract_round_trip() {
        let schema = SharingSchema::new().unwrap();
        let a = RecordSet::from_records([item_record(
            &schema,
            "u",
            "new title".into(),
            "done".into(),
            Value::Int(1),
        )]);
        let mut b = RecordSet::from_records([item_record(
            &schema,
            "u",
            "old title".into(),
            "done".into(),
            Value::Int(0),
        )]);
        let delta = &a - &b;
        b += &delta;
        assert_eq!(b, a);
    }

    // Scenario: diff union with a conflicting title. The key survives on
    // neither side and the conflict is reported field by field.
    #[test]
    fn diff_union_with_conflict() {
        let mut schema = SharingSchema::new().unwrap();
        let r1 = item_record(&schema, "u", "A".into(), Value::NoChange, Value::NoChange);
        let r2 = item_record(&schema, "u", "B".into(), Value::NoChange, Value::NoChange);
        let d1 = Diff::from_parts([r1.clone()], std::iter::empty());
        let d2 = Diff::from_parts([r2], std::iter::empty());

        let merged = &d1 | &d2;
        assert!(merged.inclusions().next().is_none());
        assert!(merged.exclusions().next().is_none());

        let spec = pim_translator(&mut schema, true);
        let tr = Translator::new(&spec, PimStore::default());
        let conflicts = tr.explain_conflicts(&d1);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "Title");
        assert_eq!(conflicts[0].value, "A");
    }

    // Scenario: records arrive stamp-first; the sort puts the item first,
    // then the note, then the event.
    #[test]
    fn dependency_sort_orders_stamps_after_items() {
        let schema = SharingSchema::new().unwrap();
        let item = item_record(&schema, "u", "t".into(), Value::NoChange, Value::NoChange);
        let note = schema
            .note
            .make(vec![
                Value::text("u"),
                Value::Clob("body".into()),
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
            ])
            .unwrap()
            .unwrap();
        let event = schema
            .event
            .make(vec![
                Value::text("u"),
                Value::text("20080101T100000"),
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
            ])
            .unwrap()
            .unwrap();

        let sorted: Vec<String> = sort_records([event, item, note])
            .map(|r| r.class().name().to_owned())
            .collect();
        assert_eq!(sorted, vec!["ItemRecord", "NoteRecord", "EventRecord"]);
    }

    // Scenario: a filtered field never reaches the item model.
    #[test]
    fn filtered_fields_do_not_touch_the_item() {
        let mut schema = SharingSchema::new().unwrap();
        let spec = pim_translator(&mut schema, true);
        let mut tr = Translator::new(&spec, PimStore::default());

        let record = item_record(&schema, "u", "x".into(), "now".into(), Value::NoChange);
        let filtered = schema.filters.triage.apply_record(&record).unwrap();

        tr.start_import();
        tr.import_record(&filtered).unwrap();
        tr.finish_import().unwrap();

        let store = tr.into_store();
        assert_eq!(store.attr("u", "title"), Some(&Value::text("x")));
        assert_eq!(store.attr("u", "triage"), None);
    }

    // Scenario: inherit resets an attribute to its declared initial value.
    #[test]
    fn inherit_resets_to_the_initial_value() {
        let mut schema = SharingSchema::new().unwrap();
        let spec = pim_translator(&mut schema, true);
        let store = PimStore::with_initial("triage", Value::text("later"));
        let mut tr = Translator::new(&spec, store);

        tr.start_import();
        tr.import_record(&item_record(
            &schema,
            "u",
            "t".into(),
            "now".into(),
            Value::NoChange,
        ))
        .unwrap();
        tr.import_record(&item_record(
            &schema,
            "u",
            Value::NoChange,
            Value::Inherit,
            Value::NoChange,
        ))
        .unwrap();
        tr.finish_import().unwrap();

        assert_eq!(
            tr.store().attr("u", "triage"),
            Some(&Value::text("later"))
        );
    }

    // Scenario: deletions dispatch the registered deleter exactly once;
    // without one, the exclusion is silently ignored.
    #[test]
    fn deletion_dispatches_the_deleter() {
        let mut schema = SharingSchema::new().unwrap();
        let record = item_record(&schema, "u", "t".into(), Value::NoChange, Value::NoChange);
        let diff = Diff::from_parts(std::iter::empty(), [record]);

        let with_deleter = pim_translator(&mut schema, true);
        let mut tr = Translator::new(&with_deleter, PimStore::default());
        tr.import_records(&diff).unwrap();
        assert_eq!(tr.store().deleted, vec!["u".to_owned()]);

        let without = pim_translator(&mut schema, false);
        let mut tr = Translator::new(&without, PimStore::default());
        tr.import_records(&diff).unwrap();
        assert!(tr.store().deleted.is_empty());
    }

    // A freshly created item is importable end to end: uuid generation on
    // the application side, record construction, import, readback.
    #[test]
    fn round_trip_with_generated_uuids() {
        let mut schema = SharingSchema::new().unwrap();
        let spec = pim_translator(&mut schema, true);
        let mut tr = Translator::new(&spec, PimStore::default());

        let uuid = uuid::Uuid::new_v4().to_string();
        tr.start_import();
        tr.import_record(&item_record(
            &schema,
            &uuid,
            "fresh".into(),
            Value::NoChange,
            Value::Int(0),
        ))
        .unwrap();
        tr.finish_import().unwrap();
        assert_eq!(
            tr.store().attr(&uuid, "title"),
            Some(&Value::text("fresh"))
        );
    }
}
