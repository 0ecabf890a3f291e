// Route modules for the relay server
pub mod websocket; // Signaling over WebSocket
